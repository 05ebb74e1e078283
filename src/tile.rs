// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/tile.rs - 分块规划
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

use std::{cmp::Ordering, ops::Range};

use tracing::debug;

use crate::{
  config::{ConfigError, TilingConfig},
  volume::{Axis3, Shape3},
};

/// 一维半开区间 `[begin, begin + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
  pub begin: usize,
  pub len: usize,
}

impl Interval {
  pub fn new(begin: usize, len: usize) -> Self {
    Self { begin, len }
  }

  pub fn end(&self) -> usize {
    self.begin + self.len
  }

  pub fn range(&self) -> Range<usize> {
    self.begin..self.end()
  }
}

/// 分块在某一轴上的位置类别，决定裁剪规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementKind {
  /// 起点为 0 的分块，前缘是体数据边界，不裁剪
  FirstBoundary,
  /// 中间分块，裁掉前缘的 margin
  Interior,
  /// 右对齐到体数据末端的分块，只写入余数部分
  LastBoundary,
}

/// 单轴上的分块位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisPlacement {
  pub kind: PlacementKind,
  /// 读取区间，长度恒为分块大小
  pub fetch: Interval,
  /// 写入输出体的区间
  pub put: Interval,
  /// 写入内容在分块内的偏移，`put.begin = fetch.begin + margin`
  pub margin: usize,
}

impl AxisPlacement {
  fn new(kind: PlacementKind, fetch: Interval, put: Interval) -> Self {
    Self {
      kind,
      fetch,
      put,
      margin: put.begin - fetch.begin,
    }
  }

  /// 分块预测中需要写回的部分
  pub fn core(&self) -> Range<usize> {
    self.margin..self.margin + self.put.len
  }
}

/// 三维分块位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePlacement {
  /// 遍历顺序中的序号
  pub index: usize,
  pub axes: [AxisPlacement; 3],
}

impl TilePlacement {
  pub fn axis(&self, axis: Axis3) -> &AxisPlacement {
    &self.axes[axis.index()]
  }

  pub fn kinds(&self) -> [PlacementKind; 3] {
    self.axes.map(|a| a.kind)
  }

  pub fn fetch_origin(&self) -> Shape3 {
    self.axes.map(|a| a.fetch.begin)
  }

  pub fn fetch_ranges(&self) -> [Range<usize>; 3] {
    self.axes.map(|a| a.fetch.range())
  }

  pub fn put_ranges(&self) -> [Range<usize>; 3] {
    self.axes.map(|a| a.put.range())
  }

  pub fn core_ranges(&self) -> [Range<usize>; 3] {
    self.axes.map(|a| a.core())
  }

  /// 写入的体素数
  pub fn put_volume(&self) -> usize {
    self.axes.iter().map(|a| a.put.len).product()
  }
}

/// 覆盖整个体数据的分块计划
#[derive(Debug, Clone)]
pub struct TilePlan {
  shape: Shape3,
  axes: [Vec<AxisPlacement>; 3],
  placements: Vec<TilePlacement>,
}

impl TilePlan {
  pub fn shape(&self) -> Shape3 {
    self.shape
  }

  pub fn axis(&self, axis: Axis3) -> &[AxisPlacement] {
    &self.axes[axis.index()]
  }

  pub fn placements(&self) -> &[TilePlacement] {
    &self.placements
  }

  pub fn iter(&self) -> std::slice::Iter<'_, TilePlacement> {
    self.placements.iter()
  }

  pub fn len(&self) -> usize {
    self.placements.len()
  }

  pub fn is_empty(&self) -> bool {
    self.placements.is_empty()
  }

  /// 每个轴上的写入区间是否恰好划分 `[0, dimension)`
  pub fn is_partition(&self) -> bool {
    Axis3::ALL.iter().all(|&axis| {
      let mut cursor = 0;
      for placement in self.axis(axis) {
        if placement.put.begin != cursor || placement.put.len == 0 {
          return false;
        }
        cursor = placement.put.end();
      }
      cursor == self.shape[axis.index()]
    })
  }
}

impl<'a> IntoIterator for &'a TilePlan {
  type Item = &'a TilePlacement;
  type IntoIter = std::slice::Iter<'a, TilePlacement>;

  fn into_iter(self) -> Self::IntoIter {
    self.placements.iter()
  }
}

/// 分块规划器
#[derive(Debug, Clone, Copy)]
pub struct TilePlanner {
  tile_size: usize,
  stride: usize,
}

impl TilePlanner {
  pub fn new(config: &TilingConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      tile_size: config.tile_size,
      stride: config.stride,
    })
  }

  /// 计算单轴的分块位置
  ///
  /// 起点按步长递增，直到分块超出末端；若长度不能被步长整除，
  /// 或常规分块没有覆盖到末端，再追加一个右对齐的末尾分块。
  /// 最后调整相邻写入区间，使每个体素恰好被写入一次：
  /// 重叠部分留给后一个分块，空隙由后一个分块向前补齐。
  pub fn plan_axis(&self, axis: Axis3, dimension: usize) -> Result<Vec<AxisPlacement>, ConfigError> {
    let tile = self.tile_size;
    if dimension < tile {
      return Err(ConfigError::VolumeTooSmall {
        axis,
        dimension,
        tile_size: tile,
      });
    }

    let margin = (tile - self.stride) / 2;
    let mut placements: Vec<AxisPlacement> = (0..=dimension - tile)
      .step_by(self.stride)
      .map(|anchor| {
        let fetch = Interval::new(anchor, tile);
        if anchor == 0 {
          AxisPlacement::new(PlacementKind::FirstBoundary, fetch, Interval::new(0, tile))
        } else {
          AxisPlacement::new(
            PlacementKind::Interior,
            fetch,
            Interval::new(anchor + margin, tile - margin),
          )
        }
      })
      .collect();

    let reach = placements.last().map(|p| p.put.end()).unwrap_or(0);
    let remainder = dimension % self.stride;
    if remainder != 0 || reach < dimension {
      placements.push(AxisPlacement::new(
        PlacementKind::LastBoundary,
        Interval::new(dimension - tile, tile),
        Interval::new(dimension - remainder, remainder),
      ));
    }

    reconcile(&mut placements);
    debug!(
      "{} 轴: 长度 {}, 分块 {} 个, 写入区间 {:?}",
      axis,
      dimension,
      placements.len(),
      placements.iter().map(|p| p.put.range()).collect::<Vec<_>>()
    );
    Ok(placements)
  }

  /// 三个轴分块位置的笛卡尔积，宽度轴变化最快
  pub fn plan(&self, shape: Shape3) -> Result<TilePlan, ConfigError> {
    let [depth, height, width] = shape;
    let axes = [
      self.plan_axis(Axis3::Depth, depth)?,
      self.plan_axis(Axis3::Height, height)?,
      self.plan_axis(Axis3::Width, width)?,
    ];

    let mut placements = Vec::with_capacity(axes.iter().map(Vec::len).product());
    for d in &axes[0] {
      for h in &axes[1] {
        for w in &axes[2] {
          placements.push(TilePlacement {
            index: placements.len(),
            axes: [*d, *h, *w],
          });
        }
      }
    }

    let plan = TilePlan {
      shape,
      axes,
      placements,
    };
    debug_assert!(plan.is_partition());
    debug!("体数据 {:?} 共规划 {} 个分块", shape, plan.len());
    Ok(plan)
  }
}

fn reconcile(placements: &mut [AxisPlacement]) {
  for i in 1..placements.len() {
    let (head, tail) = placements.split_at_mut(i);
    let prev = &mut head[i - 1];
    let next = &mut tail[0];

    let prev_end = prev.put.end();
    match next.put.begin.cmp(&prev_end) {
      Ordering::Less => {
        debug_assert!(next.put.begin > prev.put.begin);
        prev.put.len = next.put.begin - prev.put.begin;
      }
      Ordering::Greater => {
        debug_assert!(prev_end >= next.fetch.begin);
        next.put = Interval::new(prev_end, next.put.end() - prev_end);
      }
      Ordering::Equal => {}
    }
  }

  for placement in placements.iter_mut() {
    placement.margin = placement.put.begin - placement.fetch.begin;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn planner(tile_size: usize, stride: usize) -> TilePlanner {
    TilePlanner::new(&TilingConfig::new(tile_size, stride)).unwrap()
  }

  fn puts(placements: &[AxisPlacement]) -> Vec<(usize, usize)> {
    placements.iter().map(|p| (p.put.begin, p.put.len)).collect()
  }

  /// 按名义规则顺序写入，记录每个体素最后由哪个分块写入
  fn nominal_writers(dimension: usize, tile: usize, stride: usize) -> Vec<Option<usize>> {
    let margin = (tile - stride) / 2;
    let mut anchors: Vec<(usize, usize, usize)> = (0..=dimension - tile)
      .step_by(stride)
      .map(|a| {
        if a == 0 {
          (a, 0, tile)
        } else {
          (a, a + margin, tile - margin)
        }
      })
      .collect();
    if dimension % stride != 0 {
      let len = dimension % stride;
      anchors.push((dimension - tile, dimension - len, len));
    }

    let mut writers = vec![None; dimension];
    for (index, (_, begin, len)) in anchors.into_iter().enumerate() {
      for slot in &mut writers[begin..begin + len] {
        *slot = Some(index);
      }
    }
    writers
  }

  #[test]
  fn uneven_volume_gets_right_aligned_tile() {
    let plan = planner(4, 4).plan([10, 10, 10]).unwrap();
    for axis in Axis3::ALL {
      let placements = plan.axis(axis);
      assert_eq!(placements.len(), 3);
      assert_eq!(
        placements.iter().map(|p| p.kind).collect::<Vec<_>>(),
        vec![
          PlacementKind::FirstBoundary,
          PlacementKind::Interior,
          PlacementKind::LastBoundary
        ]
      );
      assert_eq!(puts(placements), vec![(0, 4), (4, 4), (8, 2)]);
      assert_eq!(placements[2].fetch, Interval::new(6, 4));
      assert_eq!(placements[2].core(), 2..4);
    }
    assert_eq!(plan.len(), 27);
    assert!(plan.is_partition());
  }

  #[test]
  fn even_volume_has_no_remainder_tile() {
    let plan = planner(4, 4).plan([8, 8, 8]).unwrap();
    for axis in Axis3::ALL {
      assert_eq!(puts(plan.axis(axis)), vec![(0, 4), (4, 4)]);
      assert!(
        plan
          .axis(axis)
          .iter()
          .all(|p| p.kind != PlacementKind::LastBoundary)
      );
    }
    assert_eq!(plan.len(), 8);
  }

  #[test]
  fn volume_equal_to_tile_is_single_tile() {
    let placements = planner(6, 6).plan_axis(Axis3::Depth, 6).unwrap();
    assert_eq!(puts(&placements), vec![(0, 6)]);
  }

  #[test]
  fn overlapping_tiles_trim_leading_margin() {
    // 名义规则下中间分块写入 [anchor + 1, anchor + 4)，重叠部分由后一个分块写入
    let placements = planner(4, 2).plan_axis(Axis3::Width, 10).unwrap();
    assert_eq!(puts(&placements), vec![(0, 3), (3, 2), (5, 2), (7, 3)]);
    assert_eq!(placements[1].margin, 1);
    assert_eq!(placements[3].core(), 1..4);
  }

  #[test]
  fn fills_tail_left_uncovered_by_regular_anchors() {
    // 20 能被 4 整除，但常规分块只覆盖到 18
    let placements = planner(6, 4).plan_axis(Axis3::Height, 20).unwrap();
    let last = placements.last().unwrap();
    assert_eq!(last.kind, PlacementKind::LastBoundary);
    assert_eq!(last.fetch, Interval::new(14, 6));
    assert_eq!(last.put, Interval::new(18, 2));
    assert_eq!(last.core(), 4..6);
  }

  #[test]
  fn every_valid_configuration_partitions_each_axis() {
    for tile in 1..=10 {
      for stride in 1..=tile {
        if (tile - stride) % 2 != 0 {
          continue;
        }
        let planner = planner(tile, stride);
        for dimension in tile..tile + 3 * stride + 7 {
          let plan = planner.plan([dimension, tile, dimension + 1]).unwrap();
          assert!(
            plan.is_partition(),
            "tile {tile}, stride {stride}, dimension {dimension}"
          );
          for placement in plan.iter() {
            for axis in placement.axes {
              assert_eq!(axis.fetch.len, tile);
              assert!(axis.fetch.begin <= axis.put.begin);
              assert!(axis.put.end() <= axis.fetch.end());
            }
          }
        }
      }
    }
  }

  #[test]
  fn keeps_the_value_of_the_last_nominal_writer() {
    for (tile, stride) in [(4, 2), (6, 2), (8, 4), (6, 4), (10, 2), (5, 5)] {
      let planner = planner(tile, stride);
      for dimension in tile..tile + 4 * stride + 5 {
        let placements = planner.plan_axis(Axis3::Depth, dimension).unwrap();
        let nominal = nominal_writers(dimension, tile, stride);
        for (index, placement) in placements.iter().enumerate() {
          for voxel in placement.put.range() {
            if let Some(writer) = nominal[voxel] {
              assert_eq!(
                writer, index,
                "tile {tile}, stride {stride}, dimension {dimension}, voxel {voxel}"
              );
            }
          }
        }
      }
    }
  }

  #[test]
  fn equal_stride_matches_nominal_rule_exactly() {
    let placements = planner(32, 32).plan_axis(Axis3::Depth, 100).unwrap();
    assert_eq!(
      puts(&placements),
      vec![(0, 32), (32, 32), (64, 32), (96, 4)]
    );
    assert!(
      placements
        .iter()
        .all(|p| p.put.end() == p.fetch.end())
    );
  }

  #[test]
  fn rejects_volume_smaller_than_tile() {
    let err = planner(8, 8).plan([16, 7, 16]).unwrap_err();
    assert_eq!(
      err,
      ConfigError::VolumeTooSmall {
        axis: Axis3::Height,
        dimension: 7,
        tile_size: 8
      }
    );
  }

  #[test]
  fn placements_are_indexed_in_traversal_order() {
    let plan = planner(4, 4).plan([8, 4, 10]).unwrap();
    assert_eq!(plan.len(), 6);
    for (i, placement) in plan.iter().enumerate() {
      assert_eq!(placement.index, i);
    }
    assert_eq!(plan.placements()[1].fetch_origin(), [0, 0, 4]);
    assert_eq!(plan.placements()[3].fetch_origin(), [4, 0, 0]);
    let total: usize = plan.iter().map(TilePlacement::put_volume).sum();
    assert_eq!(total, 8 * 4 * 10);
  }
}
