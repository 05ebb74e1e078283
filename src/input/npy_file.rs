// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/input/npy_file.rs - NPY 文件输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # NPY 体数据输入
//!
//! 从一对 `.npy` 文件读取图像体与标签体：
//! - 图像体: `float32`，形状 `(depth, height, width)`
//! - 标签体: `int32`，形状与图像体相同
//!
//! ## URL 格式
//!
//! ```text
//! npy:///data/ct_1001_image.npy?label=/data/ct_1001_label.npy&domain=0
//! ```
//!
//! `label` 必填，`domain` 默认为 0。
//!
//! ## Cargo 特性
//!
//! 需要启用 `npy_input` 特性（默认启用）。

use std::path::PathBuf;

use ndarray_npy::{ReadNpyError, read_npy};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  volume::{ImageVolume, LabelVolume, VolumeSample},
};

#[derive(Error, Debug)]
pub enum NpyInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("文件路径编码无效: {0}")]
  InvalidPath(String),
  #[error("缺少标签文件参数 label")]
  MissingLabel,
  #[error("来源域编号无效: {0}")]
  InvalidDomain(String),
  #[error("读取 {path} 失败: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: ReadNpyError,
  },
  #[error("图像体形状 {image:?} 与标签体形状 {label:?} 不一致")]
  ShapeMismatch { image: Vec<usize>, label: Vec<usize> },
}

/// NPY 文件输入，每个 URL 产生一个样本
#[derive(Debug)]
pub struct NpyVolumeInput {
  image_path: PathBuf,
  label_path: PathBuf,
  domain: i32,
  consumed: bool,
}

impl FromUrlWithScheme for NpyVolumeInput {
  const SCHEME: &'static str = "npy";
}

impl FromUrl for NpyVolumeInput {
  type Error = NpyInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(NpyInputError::SchemeMismatch);
    }

    let mut label_path = None;
    let mut domain = 0;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "label" => label_path = Some(PathBuf::from(v.as_ref())),
        "domain" => {
          domain = v
            .parse()
            .map_err(|_| NpyInputError::InvalidDomain(v.to_string()))?
        }
        _ => {}
      }
    }

    let image_path = urlencoding::decode(url.path())
      .map_err(|_| NpyInputError::InvalidPath(url.path().to_string()))?;

    Ok(NpyVolumeInput {
      image_path: PathBuf::from(image_path.as_ref()),
      label_path: label_path.ok_or(NpyInputError::MissingLabel)?,
      domain,
      consumed: false,
    })
  }
}

impl NpyVolumeInput {
  pub fn domain(&self) -> i32 {
    self.domain
  }

  fn load(&self) -> Result<VolumeSample, NpyInputError> {
    info!("读取图像体: {}", self.image_path.display());
    let image: ImageVolume = read_npy(&self.image_path).map_err(|source| NpyInputError::Read {
      path: self.image_path.clone(),
      source,
    })?;
    info!("读取标签体: {}", self.label_path.display());
    let label: LabelVolume = read_npy(&self.label_path).map_err(|source| NpyInputError::Read {
      path: self.label_path.clone(),
      source,
    })?;

    if image.dim() != label.dim() {
      return Err(NpyInputError::ShapeMismatch {
        image: image.shape().to_vec(),
        label: label.shape().to_vec(),
      });
    }

    let name = self
      .image_path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    Ok(VolumeSample {
      name,
      image,
      label,
      domain: self.domain,
    })
  }
}

impl Iterator for NpyVolumeInput {
  type Item = Result<VolumeSample, NpyInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.consumed {
      return None;
    }
    self.consumed = true;
    Some(self.load())
  }
}
