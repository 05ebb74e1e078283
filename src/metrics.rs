// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/metrics.rs - 分割与来源域评估指标
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

use ndarray::{ArrayView3, Zip};
use thiserror::Error;

use crate::volume::{Shape3, shape_of};

/// 所有比值分母上的平滑项，分子分母同为 0 时结果为 0
pub const EPSILON: f64 = 1e-5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
  #[error("输出体形状 {output:?} 与标签体形状 {label:?} 不一致")]
  ShapeMismatch { output: Shape3, label: Shape3 },
}

/// 每个类别一项的四种重叠指标
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
  pub dice: Vec<f64>,
  pub jaccard: Vec<f64>,
  pub precision: Vec<f64>,
  pub recall: Vec<f64>,
}

impl ClassMetrics {
  pub fn class_count(&self) -> usize {
    self.dice.len()
  }

  /// 某一类别的 `[dice, jaccard, precision, recall]`
  pub fn class(&self, class: usize) -> [f64; 4] {
    [
      self.dice[class],
      self.jaccard[class],
      self.precision[class],
      self.recall[class],
    ]
  }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
  predicted: u64,
  truth: u64,
  intersection: u64,
}

/// 按类别计算 dice、jaccard、precision、recall
///
/// 取值不在 `[0, class_count)` 内的体素（例如哨兵值）不属于任何类别。
pub fn class_metrics(
  output: &ArrayView3<'_, i32>,
  label: &ArrayView3<'_, i32>,
  class_count: usize,
) -> Result<ClassMetrics, MetricsError> {
  if output.dim() != label.dim() {
    return Err(MetricsError::ShapeMismatch {
      output: shape_of(output),
      label: shape_of(label),
    });
  }

  let class_of = |value: i32| usize::try_from(value).ok().filter(|&c| c < class_count);
  let mut counts = vec![Counts::default(); class_count];
  Zip::from(output).and(label).for_each(|&o, &l| {
    let predicted = class_of(o);
    let truth = class_of(l);
    if let Some(c) = predicted {
      counts[c].predicted += 1;
    }
    if let Some(c) = truth {
      counts[c].truth += 1;
    }
    if let (Some(p), Some(t)) = (predicted, truth) {
      if p == t {
        counts[p].intersection += 1;
      }
    }
  });

  let mut metrics = ClassMetrics {
    dice: Vec::with_capacity(class_count),
    jaccard: Vec::with_capacity(class_count),
    precision: Vec::with_capacity(class_count),
    recall: Vec::with_capacity(class_count),
  };
  for count in counts {
    let intersection = count.intersection as f64;
    let predicted = count.predicted as f64;
    let truth = count.truth as f64;
    let union = predicted + truth - intersection;

    metrics
      .dice
      .push(2.0 * intersection / (predicted + truth + EPSILON));
    metrics.jaccard.push(intersection / (union + EPSILON));
    metrics.precision.push(intersection / (predicted + EPSILON));
    metrics.recall.push(intersection / (truth + EPSILON));
  }
  Ok(metrics)
}

/// 分块来源域预测中与真实来源域一致的比例
pub fn domain_accuracy(predicted: &[i32], truth: i32) -> f64 {
  let correct = predicted.iter().filter(|&&id| id == truth).count();
  correct as f64 / (predicted.len() as f64 + EPSILON)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::{Array3, array};

  use super::*;

  #[test]
  fn identical_volumes_score_one_for_present_classes() {
    let label = Array3::from_shape_fn((4, 5, 6), |(d, h, w)| ((d + 2 * h + w) % 3) as i32);
    let metrics = class_metrics(&label.view(), &label.view(), 5).unwrap();

    for class in 0..3 {
      for value in metrics.class(class) {
        assert_abs_diff_eq!(value, 1.0, epsilon = 1e-4);
      }
    }
    for class in 3..5 {
      assert_eq!(metrics.class(class), [0.0; 4]);
    }
  }

  #[test]
  fn counts_overlap_per_class() {
    // 类别 1: 预测 3 个，真实 2 个，交集 1 个，并集 4 个
    let output = array![[[1, 1, 1, 0]]];
    let label = array![[[0, 1, 0, 1]]];
    let metrics = class_metrics(&output.view(), &label.view(), 2).unwrap();

    assert_abs_diff_eq!(metrics.dice[1], 2.0 / 5.0, epsilon = 1e-5);
    assert_abs_diff_eq!(metrics.jaccard[1], 1.0 / 4.0, epsilon = 1e-5);
    assert_abs_diff_eq!(metrics.precision[1], 1.0 / 3.0, epsilon = 1e-5);
    assert_abs_diff_eq!(metrics.recall[1], 1.0 / 2.0, epsilon = 1e-5);

    // 类别 0: 预测 1 个，真实 2 个，交集 0 个
    assert_eq!(metrics.class(0), [0.0; 4]);
  }

  #[test]
  fn sentinel_voxels_belong_to_no_class() {
    let output = array![[[-1, 0], [1, 1]]];
    let label = array![[[0, 0], [1, 1]]];
    let metrics = class_metrics(&output.view(), &label.view(), 2).unwrap();
    assert_abs_diff_eq!(metrics.precision[0], 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(metrics.recall[0], 0.5, epsilon = 1e-4);
  }

  #[test]
  fn metrics_stay_within_unit_interval() {
    let output = Array3::from_shape_fn((5, 5, 5), |(d, h, w)| ((d * 7 + h * 3 + w) % 4) as i32);
    let label = Array3::from_shape_fn((5, 5, 5), |(d, h, w)| ((d + h * 5 + w * 2) % 4) as i32);
    let metrics = class_metrics(&output.view(), &label.view(), 6).unwrap();
    for class in 0..metrics.class_count() {
      for value in metrics.class(class) {
        assert!((0.0..=1.0).contains(&value), "class {class}: {value}");
      }
    }
  }

  #[test]
  fn rejects_mismatched_shapes() {
    let output = Array3::<i32>::zeros((2, 2, 2));
    let label = Array3::<i32>::zeros((2, 2, 3));
    assert_eq!(
      class_metrics(&output.view(), &label.view(), 2),
      Err(MetricsError::ShapeMismatch {
        output: [2, 2, 2],
        label: [2, 2, 3]
      })
    );
  }

  #[test]
  fn domain_accuracy_is_fraction_of_matches() {
    assert_abs_diff_eq!(domain_accuracy(&[3, 3, 3, 5], 3), 0.75, epsilon = 1e-5);
    assert_abs_diff_eq!(domain_accuracy(&[1, 1], 0), 0.0);
    assert_abs_diff_eq!(domain_accuracy(&[], 0), 0.0);
  }
}
