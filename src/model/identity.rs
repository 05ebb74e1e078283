// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/model/identity.rs - 直通模型
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

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Model, TileBatch, TileContext, TilePrediction},
};

#[derive(Error, Debug)]
pub enum IdentityModelError {
  #[error("URI 方案不匹配: 期望 {expected}, 实际 {found}")]
  SchemeMismatch { expected: &'static str, found: String },
}

/// 直通模型：原样返回标签批次与来源域批次
///
/// 作为基线和测试替身使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityModel;

impl FromUrlWithScheme for IdentityModel {
  const SCHEME: &'static str = "identity";
}

impl FromUrl for IdentityModel {
  type Error = IdentityModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(IdentityModelError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }
    Ok(IdentityModel)
  }
}

impl Model for IdentityModel {
  type Error = std::convert::Infallible;

  fn infer(&self, batch: &TileBatch, _context: &TileContext) -> Result<TilePrediction, Self::Error> {
    Ok(TilePrediction::echo(batch))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_url_checks_scheme() {
    let url = Url::parse("identity://").unwrap();
    assert!(IdentityModel::from_url(&url).is_ok());

    let url = Url::parse("onnx:///models/unet.onnx").unwrap();
    assert!(matches!(
      IdentityModel::from_url(&url),
      Err(IdentityModelError::SchemeMismatch { .. })
    ));
  }
}
