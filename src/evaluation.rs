// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/evaluation.rs - 跨样本评估累计
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

use ndarray::Array2;
use thiserror::Error;

use crate::metrics::ClassMetrics;

pub const DEFAULT_CLASS_COUNT: usize = 8;

/// 均值表的列顺序
pub const METRIC_NAMES: [&str; 4] = ["dice", "jaccard", "precision", "recall"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
  #[error("尚未记录任何样本")]
  Empty,
  #[error("类别数不匹配: 期望 {expected}, 实际 {found}")]
  ClassCount { expected: usize, found: usize },
}

/// 跨样本的指标记录
///
/// 每个类别各保存四条历史（dice、jaccard、precision、recall），
/// 每个样本追加一次，之后不再修改。
#[derive(Debug, Clone)]
pub struct Evaluation {
  dice: Vec<Vec<f64>>,
  jaccard: Vec<Vec<f64>>,
  precision: Vec<Vec<f64>>,
  recall: Vec<Vec<f64>>,
  domain_accuracy: Vec<f64>,
}

impl Default for Evaluation {
  fn default() -> Self {
    Self::new(DEFAULT_CLASS_COUNT)
  }
}

impl Evaluation {
  pub fn new(class_count: usize) -> Self {
    Self {
      dice: vec![Vec::new(); class_count],
      jaccard: vec![Vec::new(); class_count],
      precision: vec![Vec::new(); class_count],
      recall: vec![Vec::new(); class_count],
      domain_accuracy: Vec::new(),
    }
  }

  pub fn class_count(&self) -> usize {
    self.dice.len()
  }

  /// 已记录的分割样本数
  pub fn sample_count(&self) -> usize {
    self.dice.first().map(Vec::len).unwrap_or(0)
  }

  pub fn domain_sample_count(&self) -> usize {
    self.domain_accuracy.len()
  }

  pub fn add(&mut self, metrics: &ClassMetrics) -> Result<(), EvaluationError> {
    self.add_vectors(
      &metrics.dice,
      &metrics.jaccard,
      &metrics.precision,
      &metrics.recall,
    )
  }

  /// 追加一个样本的四组按类别指标
  pub fn add_vectors(
    &mut self,
    dice: &[f64],
    jaccard: &[f64],
    precision: &[f64],
    recall: &[f64],
  ) -> Result<(), EvaluationError> {
    let expected = self.class_count();
    for values in [dice, jaccard, precision, recall] {
      if values.len() != expected {
        return Err(EvaluationError::ClassCount {
          expected,
          found: values.len(),
        });
      }
    }

    for c in 0..expected {
      self.dice[c].push(dice[c]);
      self.jaccard[c].push(jaccard[c]);
      self.precision[c].push(precision[c]);
      self.recall[c].push(recall[c]);
    }
    Ok(())
  }

  pub fn add_domain(&mut self, accuracy: f64) {
    self.domain_accuracy.push(accuracy);
  }

  pub fn dice(&self, class: usize) -> &[f64] {
    &self.dice[class]
  }

  pub fn jaccard(&self, class: usize) -> &[f64] {
    &self.jaccard[class]
  }

  pub fn precision(&self, class: usize) -> &[f64] {
    &self.precision[class]
  }

  pub fn recall(&self, class: usize) -> &[f64] {
    &self.recall[class]
  }

  pub fn domain_history(&self) -> &[f64] {
    &self.domain_accuracy
  }

  /// 各类别各指标的跨样本均值，形状为 `class_count × 4`，列顺序见 [`METRIC_NAMES`]
  pub fn mean_metrics(&self) -> Result<Array2<f64>, EvaluationError> {
    let samples = self.sample_count();
    if samples == 0 {
      return Err(EvaluationError::Empty);
    }

    let histories = [&self.dice, &self.jaccard, &self.precision, &self.recall];
    Ok(Array2::from_shape_fn(
      (self.class_count(), histories.len()),
      |(c, m)| mean(&histories[m][c]),
    ))
  }

  pub fn mean_domain_accuracy(&self) -> Result<f64, EvaluationError> {
    if self.domain_accuracy.is_empty() {
      return Err(EvaluationError::Empty);
    }
    Ok(mean(&self.domain_accuracy))
  }
}

fn mean(values: &[f64]) -> f64 {
  values.iter().sum::<f64>() / values.len() as f64
}
