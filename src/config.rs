// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/config.rs - 分块推理配置
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

use crate::volume::Axis3;

pub const DEFAULT_TILE_SIZE: usize = 32;
pub const DEFAULT_STRIDE: usize = 32;
pub const DEFAULT_CHANNELS: usize = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("分块大小必须大于 0")]
  ZeroTileSize,
  #[error("步长必须大于 0")]
  ZeroStride,
  #[error("通道数必须大于 0")]
  ZeroChannels,
  #[error("步长 {stride} 大于分块大小 {tile_size}")]
  StrideExceedsTile { tile_size: usize, stride: usize },
  #[error("分块大小 {tile_size} 与步长 {stride} 之差必须为偶数")]
  OddOverlap { tile_size: usize, stride: usize },
  #[error("{axis} 轴长度 {dimension} 小于分块大小 {tile_size}")]
  VolumeTooSmall {
    axis: Axis3,
    dimension: usize,
    tile_size: usize,
  },
}

/// 分块推理是否允许并发
///
/// 模型可能在调用之间保存状态，因此默认顺序执行。
/// 只有调用者确认模型可重入时才应设置为 `Parallel`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
  #[default]
  Sequential,
  Parallel,
}

impl Concurrency {
  pub fn is_parallel(self) -> bool {
    matches!(self, Concurrency::Parallel)
  }
}

/// 分块推理配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingConfig {
  /// 分块边长（三个轴相同）
  pub tile_size: usize,
  /// 相邻分块起点的间距
  pub stride: usize,
  /// 图像批次的通道数
  pub channels: usize,
  pub concurrency: Concurrency,
}

impl Default for TilingConfig {
  fn default() -> Self {
    Self {
      tile_size: DEFAULT_TILE_SIZE,
      stride: DEFAULT_STRIDE,
      channels: DEFAULT_CHANNELS,
      concurrency: Concurrency::Sequential,
    }
  }
}

impl TilingConfig {
  pub fn new(tile_size: usize, stride: usize) -> Self {
    Self {
      tile_size,
      stride,
      ..Self::default()
    }
  }

  pub fn with_channels(mut self, channels: usize) -> Self {
    self.channels = channels;
    self
  }

  pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// 分块两侧重叠宽度的一半
  pub fn margin(&self) -> usize {
    self.tile_size.saturating_sub(self.stride) / 2
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.tile_size == 0 {
      return Err(ConfigError::ZeroTileSize);
    }
    if self.stride == 0 {
      return Err(ConfigError::ZeroStride);
    }
    if self.channels == 0 {
      return Err(ConfigError::ZeroChannels);
    }
    if self.stride > self.tile_size {
      return Err(ConfigError::StrideExceedsTile {
        tile_size: self.tile_size,
        stride: self.stride,
      });
    }
    if (self.tile_size - self.stride) % 2 != 0 {
      return Err(ConfigError::OddOverlap {
        tile_size: self.tile_size,
        stride: self.stride,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_is_valid_and_sequential() {
    let config = TilingConfig::default();
    assert_eq!(config.validate(), Ok(()));
    assert!(!config.concurrency.is_parallel());
    assert_eq!(config.margin(), 0);
  }

  #[test]
  fn rejects_invalid_configurations() {
    assert_eq!(
      TilingConfig::new(0, 0).validate(),
      Err(ConfigError::ZeroTileSize)
    );
    assert_eq!(
      TilingConfig::new(4, 0).validate(),
      Err(ConfigError::ZeroStride)
    );
    assert_eq!(
      TilingConfig::new(4, 4).with_channels(0).validate(),
      Err(ConfigError::ZeroChannels)
    );
    assert_eq!(
      TilingConfig::new(4, 6).validate(),
      Err(ConfigError::StrideExceedsTile {
        tile_size: 4,
        stride: 6
      })
    );
    assert_eq!(
      TilingConfig::new(5, 2).validate(),
      Err(ConfigError::OddOverlap {
        tile_size: 5,
        stride: 2
      })
    );
  }

  #[test]
  fn margin_is_half_the_overlap() {
    assert_eq!(TilingConfig::new(32, 16).margin(), 8);
    assert_eq!(TilingConfig::new(6, 2).margin(), 2);
  }
}
