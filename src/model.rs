// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/model.rs - 模型接口
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

use ndarray::{Array1, Array4, Array5, ArrayView1, ArrayView3, ArrayView4, ArrayView5, s};

use crate::{tile::TilePlacement, volume::Shape3};

/// 分块推理模型
///
/// 模型通过共享引用调用；需要在调用之间保存状态的模型
/// 应自行使用 `Mutex` 等内部可变性。
pub trait Model {
  type Error;

  fn infer(&self, batch: &TileBatch, context: &TileContext) -> Result<TilePrediction, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, batch: &TileBatch, context: &TileContext) -> Result<TilePrediction, Self::Error> {
    (**self).infer(batch, context)
  }
}

/// 单个分块的输入批次，批大小为 1
///
/// 图像形状为 `1 × t × t × t × channels`，标签形状为 `1 × t × t × t`。
/// 批次缓冲区在分块之间复用。
#[derive(Debug, Clone)]
pub struct TileBatch {
  image: Array5<f32>,
  label: Array4<i32>,
  domain: Array1<i32>,
}

impl TileBatch {
  pub fn new(tile_size: usize, channels: usize, domain: i32) -> Self {
    Self {
      image: Array5::zeros((1, tile_size, tile_size, tile_size, channels)),
      label: Array4::zeros((1, tile_size, tile_size, tile_size)),
      domain: Array1::from_elem(1, domain),
    }
  }

  /// 将分块读取区域复制到批次缓冲区，图像只写入第 0 通道
  pub fn load(
    &mut self,
    image: &ArrayView3<'_, f32>,
    label: &ArrayView3<'_, i32>,
    placement: &TilePlacement,
  ) {
    let [d, h, w] = placement.fetch_ranges();
    self
      .image
      .slice_mut(s![0, .., .., .., 0])
      .assign(&image.slice(s![d.clone(), h.clone(), w.clone()]));
    self
      .label
      .slice_mut(s![0, .., .., ..])
      .assign(&label.slice(s![d, h, w]));
  }

  pub fn image(&self) -> ArrayView5<'_, f32> {
    self.image.view()
  }

  pub fn label(&self) -> ArrayView4<'_, i32> {
    self.label.view()
  }

  pub fn domain(&self) -> ArrayView1<'_, i32> {
    self.domain.view()
  }

  pub fn tile_size(&self) -> usize {
    self.label.dim().1
  }

  pub fn channels(&self) -> usize {
    self.image.dim().4
  }
}

/// 分块推理的附加上下文
#[derive(Debug, Clone, Copy)]
pub struct TileContext {
  pub placement: TilePlacement,
  /// 读取起点相对体数据形状的位置，取值 `[0, 1)`
  pub relative_origin: [f32; 3],
  /// 当前样本在本轮评估中的序号
  pub sample: usize,
}

impl TileContext {
  pub fn new(placement: &TilePlacement, shape: Shape3, sample: usize) -> Self {
    let origin = placement.fetch_origin();
    Self {
      placement: *placement,
      relative_origin: [0, 1, 2].map(|i| origin[i] as f32 / shape[i] as f32),
      sample,
    }
  }

  pub fn index(&self) -> usize {
    self.placement.index
  }
}

/// 模型对单个分块的预测
#[derive(Debug, Clone)]
pub struct TilePrediction {
  /// 预测标签，形状须与输入标签批次一致
  pub label: Array4<i32>,
  /// 预测的来源域，长度须为 1
  pub domain: Array1<i32>,
}

impl TilePrediction {
  pub fn new(label: Array4<i32>, domain: Array1<i32>) -> Self {
    Self { label, domain }
  }

  /// 原样返回输入批次
  pub fn echo(batch: &TileBatch) -> Self {
    Self {
      label: batch.label.clone(),
      domain: batch.domain.clone(),
    }
  }
}

mod identity;
pub use self::identity::{IdentityModel, IdentityModelError};
