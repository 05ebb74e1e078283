// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/observer.rs - 推理过程观测
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

use std::time::Duration;

use tracing::{debug, info};

use crate::tile::{TilePlacement, TilePlan};

/// 单个分块完成推理并写回
#[derive(Debug, Clone, Copy)]
pub struct TileEvent<'a> {
  pub placement: &'a TilePlacement,
  pub total: usize,
  pub predicted_domain: i32,
  pub elapsed: Duration,
}

/// 单个类别的指标
#[derive(Debug, Clone, Copy)]
pub struct ClassEvent {
  pub class: usize,
  pub dice: f64,
  pub jaccard: f64,
  pub precision: f64,
  pub recall: f64,
}

/// 一个样本的来源域准确率
#[derive(Debug, Clone, Copy)]
pub struct DomainEvent {
  pub sample: usize,
  pub truth: i32,
  pub tiles: usize,
  pub accuracy: f64,
}

/// 一次分块推理结束
#[derive(Debug, Clone, Copy)]
pub struct RunEvent {
  pub sample: usize,
  pub tiles: usize,
  pub elapsed: Duration,
}

/// 推理过程的观测回调，所有方法默认不做任何事
pub trait InferenceObserver {
  fn on_plan(&mut self, _plan: &TilePlan) {}

  fn on_tile(&mut self, _event: &TileEvent<'_>) {}

  fn on_run(&mut self, _event: &RunEvent) {}

  fn on_domain(&mut self, _event: &DomainEvent) {}

  fn on_class(&mut self, _event: &ClassEvent) {}

  /// 指标计算耗时
  fn on_metrics(&mut self, _elapsed: Duration) {}
}

impl InferenceObserver for () {}

impl<O: InferenceObserver + ?Sized> InferenceObserver for &mut O {
  fn on_plan(&mut self, plan: &TilePlan) {
    (**self).on_plan(plan)
  }

  fn on_tile(&mut self, event: &TileEvent<'_>) {
    (**self).on_tile(event)
  }

  fn on_run(&mut self, event: &RunEvent) {
    (**self).on_run(event)
  }

  fn on_domain(&mut self, event: &DomainEvent) {
    (**self).on_domain(event)
  }

  fn on_class(&mut self, event: &ClassEvent) {
    (**self).on_class(event)
  }

  fn on_metrics(&mut self, elapsed: Duration) {
    (**self).on_metrics(elapsed)
  }
}

/// 通过 tracing 输出观测事件
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl InferenceObserver for TracingObserver {
  fn on_plan(&mut self, plan: &TilePlan) {
    info!("体数据形状 {:?}, 共 {} 个分块", plan.shape(), plan.len());
  }

  fn on_tile(&mut self, event: &TileEvent<'_>) {
    debug!(
      "分块 {}/{} 完成: 读取起点 {:?}, 类别 {:?}, 写入 {} 个体素, 预测来源域 {}, 耗时 {:.2?}",
      event.placement.index + 1,
      event.total,
      event.placement.fetch_origin(),
      event.placement.kinds(),
      event.placement.put_volume(),
      event.predicted_domain,
      event.elapsed
    );
  }

  fn on_run(&mut self, event: &RunEvent) {
    info!(
      "样本 {} 推理完成: {} 个分块, 耗时 {:.2?}",
      event.sample, event.tiles, event.elapsed
    );
  }

  fn on_domain(&mut self, event: &DomainEvent) {
    info!(
      "样本 {} 来源域准确率: {:.4} (真实来源域 {}, {} 个分块)",
      event.sample, event.accuracy, event.truth, event.tiles
    );
  }

  fn on_class(&mut self, event: &ClassEvent) {
    info!(
      "类别 {}: dice {:.4}, jaccard {:.4}, precision {:.4}, recall {:.4}",
      event.class, event.dice, event.jaccard, event.precision, event.recall
    );
  }

  fn on_metrics(&mut self, elapsed: Duration) {
    debug!("指标计算耗时: {:.2?}", elapsed);
  }
}
