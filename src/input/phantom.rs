// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/input/phantom.rs - 合成体数据输入
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

use ndarray::Array3;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  volume::{Shape3, VolumeSample},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PhantomInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {key} 无效: {value}")]
  InvalidParameter { key: String, value: String },
}

/// 同心球壳构成的合成体数据，用于无数据时的冒烟测试
///
/// `phantom://?shape=64x64x48&classes=8&domain=0&count=2`
#[derive(Debug, Clone)]
pub struct PhantomVolumeInput {
  shape: Shape3,
  classes: usize,
  domain: i32,
  remaining: usize,
  produced: usize,
}

impl FromUrlWithScheme for PhantomVolumeInput {
  const SCHEME: &'static str = "phantom";
}

impl FromUrl for PhantomVolumeInput {
  type Error = PhantomInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PhantomInputError::SchemeMismatch);
    }

    let mut input = PhantomVolumeInput {
      shape: [32, 32, 32],
      classes: 8,
      domain: 0,
      remaining: 1,
      produced: 0,
    };
    for (k, v) in url.query_pairs() {
      let invalid = || PhantomInputError::InvalidParameter {
        key: k.to_string(),
        value: v.to_string(),
      };
      match k.as_ref() {
        "shape" => input.shape = parse_shape(&v).ok_or_else(invalid)?,
        "classes" => input.classes = v.parse::<usize>().ok().filter(|&c| c > 0).ok_or_else(invalid)?,
        "domain" => input.domain = v.parse().map_err(|_| invalid())?,
        "count" => input.remaining = v.parse().map_err(|_| invalid())?,
        _ => {}
      }
    }
    Ok(input)
  }
}

fn parse_shape(value: &str) -> Option<Shape3> {
  let dims: Vec<usize> = value
    .split('x')
    .map(|d| d.trim().parse::<usize>().ok().filter(|&d| d > 0))
    .collect::<Option<_>>()?;
  dims.try_into().ok()
}

impl PhantomVolumeInput {
  pub fn new(shape: Shape3, classes: usize, domain: i32) -> Self {
    Self {
      shape,
      classes: classes.max(1),
      domain,
      remaining: 1,
      produced: 0,
    }
  }

  pub fn with_count(mut self, count: usize) -> Self {
    self.remaining = count;
    self
  }

  /// 生成第 `index` 个样本，球心随序号平移
  pub fn generate(&self, index: usize) -> VolumeSample {
    let [d, h, w] = self.shape;
    let center = [d, h, w].map(|n| n as f32 / 2.0);
    let shift = index as f32;
    let radius = [d, h, w].into_iter().min().unwrap_or(1) as f32 / 2.0;
    let shell = radius / self.classes as f32;

    let label = Array3::from_shape_fn((d, h, w), |(z, y, x)| {
      let dz = z as f32 - center[0] - shift;
      let dy = y as f32 - center[1];
      let dx = x as f32 - center[2];
      let distance = (dz * dz + dy * dy + dx * dx).sqrt();
      let class = (distance / shell) as usize;
      (self.classes - 1).saturating_sub(class.min(self.classes - 1)) as i32
    });
    let image = label.mapv(|c| c as f32 / self.classes as f32);

    VolumeSample {
      name: format!("phantom-{index}"),
      image,
      label,
      domain: self.domain,
    }
  }
}

impl Iterator for PhantomVolumeInput {
  type Item = Result<VolumeSample, PhantomInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    let sample = self.generate(self.produced);
    self.produced += 1;
    Some(Ok(sample))
  }
}
