// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/input.rs - 体数据输入源
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

use crate::{FromUrl, FromUrlWithScheme, volume::VolumeSample};

#[cfg(feature = "npy_input")]
mod npy_file;
#[cfg(feature = "npy_input")]
pub use self::npy_file::{NpyInputError, NpyVolumeInput};

mod phantom;
pub use self::phantom::{PhantomInputError, PhantomVolumeInput};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "npy_input")]
  #[error("NPY input error: {0}")]
  NpyInputError(#[from] NpyInputError),
  #[error("Phantom input error: {0}")]
  PhantomInputError(#[from] PhantomInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 按 URL 方案选择的输入源
#[derive(Debug)]
pub enum InputWrapper {
  #[cfg(feature = "npy_input")]
  Npy(NpyVolumeInput),
  Phantom(PhantomVolumeInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "npy_input")]
    {
      if url.scheme() == NpyVolumeInput::SCHEME {
        return Ok(InputWrapper::Npy(NpyVolumeInput::from_url(url)?));
      }
    }
    if url.scheme() == PhantomVolumeInput::SCHEME {
      return Ok(InputWrapper::Phantom(PhantomVolumeInput::from_url(url)?));
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = Result<VolumeSample, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "npy_input")]
      InputWrapper::Npy(input) => input.next().map(|r| r.map_err(InputError::from)),
      InputWrapper::Phantom(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

#[cfg(test)]
mod tests {
  use url::Url;

  use super::*;

  #[test]
  fn dispatches_on_scheme() {
    let url = Url::parse("phantom://?shape=4x4x4&count=2").unwrap();
    let input = InputWrapper::from_url(&url).unwrap();
    assert!(matches!(input, InputWrapper::Phantom(_)));
    let samples: Vec<_> = input.collect::<Result<_, _>>().unwrap();
    assert_eq!(samples.len(), 2);

    let url = Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn phantom_parameter_errors_are_wrapped() {
    let url = Url::parse("phantom://?classes=0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::PhantomInputError(_))
    ));
  }
}
