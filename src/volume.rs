// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/volume.rs - 三维体数据定义
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

use ndarray::{Array3, ArrayView3};

/// 尚未写入的输出体素
pub const SENTINEL: i32 = -1;

/// 体数据形状 (depth, height, width)
pub type Shape3 = [usize; 3];

/// 标签体，每个体素为类别编号
pub type LabelVolume = Array3<i32>;

/// 图像体，每个体素为强度值
pub type ImageVolume = Array3<f32>;

/// 三个空间轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis3 {
  Depth,
  Height,
  Width,
}

impl Axis3 {
  pub const ALL: [Axis3; 3] = [Axis3::Depth, Axis3::Height, Axis3::Width];

  pub fn index(self) -> usize {
    match self {
      Axis3::Depth => 0,
      Axis3::Height => 1,
      Axis3::Width => 2,
    }
  }
}

impl std::fmt::Display for Axis3 {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Axis3::Depth => "depth",
      Axis3::Height => "height",
      Axis3::Width => "width",
    };
    f.write_str(name)
  }
}

pub fn shape_of<T>(volume: &ArrayView3<'_, T>) -> Shape3 {
  let (d, h, w) = volume.dim();
  [d, h, w]
}

/// 一个待评估的样本：图像、标签与来源域
#[derive(Debug, Clone)]
pub struct VolumeSample {
  /// 样本名称，仅用于日志
  pub name: String,
  pub image: ImageVolume,
  pub label: LabelVolume,
  /// 真实来源域编号
  pub domain: i32,
}

impl VolumeSample {
  pub fn shape(&self) -> Shape3 {
    shape_of(&self.label.view())
  }

  /// 图像与标签形状是否一致
  pub fn is_consistent(&self) -> bool {
    self.image.dim() == self.label.dim()
  }
}
