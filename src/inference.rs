// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/inference.rs - 分块推理与拼接
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

use std::time::{Duration, Instant};

use ndarray::{Array3, ArrayView3, s};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::{
  config::{ConfigError, TilingConfig},
  evaluation::{Evaluation, EvaluationError},
  metrics::{MetricsError, class_metrics, domain_accuracy},
  model::{Model, TileBatch, TileContext, TilePrediction},
  observer::{ClassEvent, DomainEvent, InferenceObserver, RunEvent, TileEvent, TracingObserver},
  tile::{TilePlacement, TilePlan, TilePlanner},
  volume::{LabelVolume, SENTINEL, Shape3, shape_of},
};

#[derive(Error, Debug)]
pub enum InferenceError<E> {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("图像体形状 {image:?} 与标签体形状 {label:?} 不一致")]
  VolumeShape { image: Shape3, label: Shape3 },
  #[error("分块 {tile} 的预测形状 {found:?} 与输入形状 {expected:?} 不一致")]
  PredictionShape {
    tile: usize,
    expected: Vec<usize>,
    found: Vec<usize>,
  },
  #[error("分块 {tile} 的来源域批次长度应为 1, 实际为 {found}")]
  DomainBatch { tile: usize, found: usize },
  #[error("模型推理错误: {0}")]
  Model(#[source] E),
  #[error("指标计算错误: {0}")]
  Metrics(#[from] MetricsError),
  #[error("评估记录错误: {0}")]
  Evaluation(#[from] EvaluationError),
}

/// 一次分块推理的结果
#[derive(Debug, Clone)]
pub struct InferenceOutput {
  /// 拼接后的预测标签体
  pub volume: LabelVolume,
  /// 每个分块预测的来源域，按分块顺序排列
  pub domains: Vec<i32>,
}

/// 分块推理驱动
///
/// 按分块计划逐块读取图像与标签，调用模型，
/// 并把每块预测的核心区域写回输出体。
pub struct TiledInference<M, O = TracingObserver> {
  config: TilingConfig,
  planner: TilePlanner,
  model: M,
  observer: O,
}

impl<M: Model> TiledInference<M> {
  pub fn new(config: TilingConfig, model: M) -> Result<Self, ConfigError> {
    let planner = TilePlanner::new(&config)?;
    Ok(Self {
      config,
      planner,
      model,
      observer: TracingObserver,
    })
  }
}

impl<M, O> TiledInference<M, O> {
  pub fn with_observer<P: InferenceObserver>(self, observer: P) -> TiledInference<M, P> {
    TiledInference {
      config: self.config,
      planner: self.planner,
      model: self.model,
      observer,
    }
  }

  pub fn config(&self) -> &TilingConfig {
    &self.config
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn observer(&self) -> &O {
    &self.observer
  }

  pub fn into_parts(self) -> (M, O) {
    (self.model, self.observer)
  }
}

impl<M, O> TiledInference<M, O>
where
  M: Model + Sync,
  M::Error: Send,
  O: InferenceObserver,
{
  /// 对整个体数据做分块推理
  ///
  /// `sample` 仅传给模型作为上下文。
  pub fn run(
    &mut self,
    image: &ArrayView3<'_, f32>,
    label: &ArrayView3<'_, i32>,
    domain: i32,
    sample: usize,
  ) -> Result<InferenceOutput, InferenceError<M::Error>> {
    if image.dim() != label.dim() {
      return Err(InferenceError::VolumeShape {
        image: shape_of(image),
        label: shape_of(label),
      });
    }

    let plan = self.planner.plan(shape_of(label))?;
    self.observer.on_plan(&plan);

    let start = Instant::now();
    let mut volume = Array3::from_elem(label.dim(), SENTINEL);
    let domains = if self.config.concurrency.is_parallel() {
      self.run_parallel(image, label, domain, sample, &plan, &mut volume)?
    } else {
      self.run_sequential(image, label, domain, sample, &plan, &mut volume)?
    };

    self.observer.on_run(&RunEvent {
      sample,
      tiles: plan.len(),
      elapsed: start.elapsed(),
    });
    Ok(InferenceOutput { volume, domains })
  }

  fn run_sequential(
    &mut self,
    image: &ArrayView3<'_, f32>,
    label: &ArrayView3<'_, i32>,
    domain: i32,
    sample: usize,
    plan: &TilePlan,
    volume: &mut LabelVolume,
  ) -> Result<Vec<i32>, InferenceError<M::Error>> {
    let tile_size = self.config.tile_size;
    let mut batch = TileBatch::new(tile_size, self.config.channels, domain);
    let mut domains = Vec::with_capacity(plan.len());

    for placement in plan {
      let now = Instant::now();
      batch.load(image, label, placement);
      let context = TileContext::new(placement, plan.shape(), sample);
      let prediction = self
        .model
        .infer(&batch, &context)
        .map_err(InferenceError::Model)?;
      let predicted_domain = check_prediction(&prediction, placement, tile_size)?;

      let [cd, ch, cw] = placement.core_ranges();
      stitch(
        volume,
        &prediction.label.slice(s![0, cd, ch, cw]),
        placement,
      );
      domains.push(predicted_domain);

      self.observer.on_tile(&TileEvent {
        placement,
        total: plan.len(),
        predicted_domain,
        elapsed: now.elapsed(),
      });
    }
    Ok(domains)
  }

  /// 各分块的写入区间互不相交，推理可以在 rayon 线程池上并行，
  /// 每个工作线程持有自己的批次缓冲区；核心区域按分块顺序写回。
  fn run_parallel(
    &mut self,
    image: &ArrayView3<'_, f32>,
    label: &ArrayView3<'_, i32>,
    domain: i32,
    sample: usize,
    plan: &TilePlan,
    volume: &mut LabelVolume,
  ) -> Result<Vec<i32>, InferenceError<M::Error>> {
    let tile_size = self.config.tile_size;
    let channels = self.config.channels;
    let model = &self.model;
    debug!("并行推理 {} 个分块", plan.len());

    let cores: Vec<(Array3<i32>, i32, Duration)> = plan
      .placements()
      .par_iter()
      .map_init(
        || TileBatch::new(tile_size, channels, domain),
        |batch, placement| -> Result<(Array3<i32>, i32, Duration), InferenceError<M::Error>> {
          let now = Instant::now();
          batch.load(image, label, placement);
          let context = TileContext::new(placement, plan.shape(), sample);
          let prediction = model
            .infer(batch, &context)
            .map_err(InferenceError::Model)?;
          let predicted_domain = check_prediction(&prediction, placement, tile_size)?;
          let [cd, ch, cw] = placement.core_ranges();
          let core = prediction.label.slice(s![0, cd, ch, cw]).to_owned();
          Ok((core, predicted_domain, now.elapsed()))
        },
      )
      .collect::<Result<_, _>>()?;

    let mut domains = Vec::with_capacity(plan.len());
    for (placement, (core, predicted_domain, elapsed)) in plan.iter().zip(cores) {
      stitch(volume, &core.view(), placement);
      domains.push(predicted_domain);
      self.observer.on_tile(&TileEvent {
        placement,
        total: plan.len(),
        predicted_domain,
        elapsed,
      });
    }
    Ok(domains)
  }

  /// 分块推理并计算指标，结果追加到 `evaluation`
  pub fn run_inference(
    &mut self,
    image: &ArrayView3<'_, f32>,
    label: &ArrayView3<'_, i32>,
    domain: i32,
    evaluation: &mut Evaluation,
  ) -> Result<LabelVolume, InferenceError<M::Error>> {
    let sample = evaluation.sample_count();
    let output = self.run(image, label, domain, sample)?;

    let accuracy = domain_accuracy(&output.domains, domain);
    self.observer.on_domain(&DomainEvent {
      sample,
      truth: domain,
      tiles: output.domains.len(),
      accuracy,
    });

    let now = Instant::now();
    let metrics = class_metrics(&output.volume.view(), label, evaluation.class_count())?;
    for class in 0..metrics.class_count() {
      let [dice, jaccard, precision, recall] = metrics.class(class);
      self.observer.on_class(&ClassEvent {
        class,
        dice,
        jaccard,
        precision,
        recall,
      });
    }
    self.observer.on_metrics(now.elapsed());

    evaluation.add(&metrics)?;
    evaluation.add_domain(accuracy);
    Ok(output.volume)
  }
}

/// 使用默认观测器完成一次分块推理与评估
pub fn run_inference<M>(
  image: &ArrayView3<'_, f32>,
  label: &ArrayView3<'_, i32>,
  domain: i32,
  config: TilingConfig,
  model: &M,
  evaluation: &mut Evaluation,
) -> Result<LabelVolume, InferenceError<M::Error>>
where
  M: Model + Sync,
  M::Error: Send,
{
  let mut inference = TiledInference::new(config, model)?;
  inference.run_inference(image, label, domain, evaluation)
}

fn check_prediction<E>(
  prediction: &TilePrediction,
  placement: &TilePlacement,
  tile_size: usize,
) -> Result<i32, InferenceError<E>> {
  let expected = [1, tile_size, tile_size, tile_size];
  if prediction.label.shape() != expected {
    return Err(InferenceError::PredictionShape {
      tile: placement.index,
      expected: expected.to_vec(),
      found: prediction.label.shape().to_vec(),
    });
  }
  match prediction.domain.as_slice() {
    Some(&[id]) => Ok(id),
    _ => Err(InferenceError::DomainBatch {
      tile: placement.index,
      found: prediction.domain.len(),
    }),
  }
}

fn stitch(volume: &mut LabelVolume, core: &ArrayView3<'_, i32>, placement: &TilePlacement) {
  let [pd, ph, pw] = placement.put_ranges();
  volume.slice_mut(s![pd, ph, pw]).assign(core);
}
