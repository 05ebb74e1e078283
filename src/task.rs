// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/task.rs - 评估任务
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

use std::{sync::mpsc, thread, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
  config::TilingConfig,
  evaluation::{DEFAULT_CLASS_COUNT, Evaluation, METRIC_NAMES},
  inference::TiledInference,
  model::Model,
  observer::InferenceObserver,
  volume::VolumeSample,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, observer: O) -> Result<Self::Output, Self::Error>;
}

/// 逐个样本分块推理并累计评估指标
#[derive(Debug, Clone)]
pub struct EvaluateTask {
  config: TilingConfig,
  class_count: usize,
  sample_limit: Option<usize>,
  interrupt: bool,
}

impl Default for EvaluateTask {
  fn default() -> Self {
    Self::new(TilingConfig::default())
  }
}

impl EvaluateTask {
  pub fn new(config: TilingConfig) -> Self {
    Self {
      config,
      class_count: DEFAULT_CLASS_COUNT,
      sample_limit: None,
      interrupt: false,
    }
  }

  pub fn with_class_count(mut self, class_count: usize) -> Self {
    self.class_count = class_count;
    self
  }

  pub fn with_sample_limit(mut self, sample_limit: Option<usize>) -> Self {
    self.sample_limit = sample_limit;
    self
  }

  /// 安装 Ctrl-C 处理函数，收到信号后在当前样本结束时退出
  ///
  /// 处理函数在进程内只能安装一次。
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }

  pub fn config(&self) -> &TilingConfig {
    &self.config
  }
}

fn install_interrupt() -> Result<mpsc::Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("设置 Ctrl-C 处理函数失败")?;
  Ok(rx)
}

impl<IE, I, M, O> Task<I, M, O> for EvaluateTask
where
  IE: std::error::Error + Send + Sync + 'static,
  I: Iterator<Item = Result<VolumeSample, IE>>,
  M: Model + Sync,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: InferenceObserver,
{
  type Output = Evaluation;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, observer: O) -> Result<Self::Output, Self::Error> {
    info!("开始评估任务...");
    let mut inference = TiledInference::new(self.config, model)
      .context("分块配置无效")?
      .with_observer(observer);
    let interrupt = if self.interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };

    let mut evaluation = Evaluation::new(self.class_count);
    let mut skipped = 0;
    for (index, sample) in input.enumerate() {
      if self
        .sample_limit
        .is_some_and(|limit| evaluation.sample_count() >= limit)
      {
        info!("达到指定样本数 {}, 退出任务循环", evaluation.sample_count());
        break;
      }

      let sample = sample.with_context(|| format!("读取第 {} 个样本失败", index + 1))?;
      if !sample.is_consistent() {
        warn!(
          "样本 {} 的图像体 {:?} 与标签体 {:?} 形状不一致，跳过",
          sample.name,
          sample.image.shape(),
          sample.label.shape()
        );
        skipped += 1;
        continue;
      }

      info!(
        "处理第 {} 个样本 {}, 形状 {:?}, 来源域 {}",
        evaluation.sample_count() + 1,
        sample.name,
        sample.shape(),
        sample.domain
      );
      let now = std::time::Instant::now();
      inference
        .run_inference(
          &sample.image.view(),
          &sample.label.view(),
          sample.domain,
          &mut evaluation,
        )
        .with_context(|| format!("样本 {} 推理失败", sample.name))?;
      info!("样本 {} 完成，耗时: {:.2?}", sample.name, now.elapsed());

      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    if skipped > 0 {
      warn!("共跳过 {} 个形状不一致的样本", skipped);
    }
    if evaluation.sample_count() == 0 {
      warn!("没有完成任何样本，不输出平均指标");
    } else {
      log_means(&evaluation)?;
    }

    info!("任务完成，退出");
    Ok(evaluation)
  }
}

/// 输出各类别平均指标与平均来源域准确率
pub fn log_means(evaluation: &Evaluation) -> Result<()> {
  let means = evaluation.mean_metrics()?;
  info!(
    "{} 个样本的平均指标 ({})",
    evaluation.sample_count(),
    METRIC_NAMES.join(", ")
  );
  for (class, row) in means.outer_iter().enumerate() {
    info!(
      "类别 {}: {:.4} {:.4} {:.4} {:.4}",
      class, row[0], row[1], row[2], row[3]
    );
  }
  match evaluation.mean_domain_accuracy() {
    Ok(accuracy) => warn!("平均来源域准确率: {:.4}", accuracy),
    Err(e) => warn!("无法计算平均来源域准确率: {}", e),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use approx::assert_abs_diff_eq;
  use ndarray::Array3;

  use super::*;
  use crate::model::IdentityModel;

  fn sample(name: &str, shape: (usize, usize, usize)) -> VolumeSample {
    let label = Array3::from_shape_fn(shape, |(d, h, w)| ((d / 2 + h + w) % 3) as i32);
    VolumeSample {
      name: name.to_string(),
      image: label.mapv(|v| v as f32),
      label,
      domain: 1,
    }
  }

  fn task() -> EvaluateTask {
    EvaluateTask::new(TilingConfig::new(4, 4)).with_class_count(3)
  }

  #[test]
  fn evaluates_every_sample() {
    let input = vec![sample("a", (8, 8, 8)), sample("b", (10, 9, 8))]
      .into_iter()
      .map(Ok::<_, Infallible>);
    let evaluation = task().run_task(input, IdentityModel, ()).unwrap();

    assert_eq!(evaluation.sample_count(), 2);
    assert_eq!(evaluation.domain_sample_count(), 2);
    let means = evaluation.mean_metrics().unwrap();
    for value in means.iter() {
      assert_abs_diff_eq!(*value, 1.0, epsilon = 1e-4);
    }
    assert_abs_diff_eq!(evaluation.mean_domain_accuracy().unwrap(), 1.0);
  }

  #[test]
  fn stops_at_sample_limit() {
    let input = (0..5)
      .map(|i| sample(&format!("s{i}"), (4, 4, 4)))
      .map(Ok::<_, Infallible>);
    let evaluation = task()
      .with_sample_limit(Some(2))
      .run_task(input, IdentityModel, ())
      .unwrap();
    assert_eq!(evaluation.sample_count(), 2);
  }

  #[test]
  fn skips_inconsistent_samples() {
    let mut broken = sample("broken", (8, 8, 8));
    broken.image = Array3::zeros((8, 8, 4));
    let input = vec![broken, sample("ok", (8, 8, 8))]
      .into_iter()
      .map(Ok::<_, Infallible>);
    let evaluation = task().run_task(input, IdentityModel, ()).unwrap();
    assert_eq!(evaluation.sample_count(), 1);
  }

  #[test]
  fn rejects_invalid_config_and_small_volumes() {
    let input = std::iter::empty::<Result<VolumeSample, Infallible>>();
    let result = EvaluateTask::new(TilingConfig::new(4, 6)).run_task(input, IdentityModel, ());
    assert!(result.is_err());

    let input = std::iter::once(Ok::<_, Infallible>(sample("tiny", (2, 8, 8))));
    assert!(task().run_task(input, IdentityModel, ()).is_err());
  }

  #[test]
  fn input_errors_are_propagated() {
    #[derive(Debug, thiserror::Error)]
    #[error("磁盘读取失败")]
    struct ReadFailure;

    let input = std::iter::once(Err::<VolumeSample, _>(ReadFailure));
    let error = task().run_task(input, IdentityModel, ()).unwrap_err();
    assert!(error.to_string().contains("第 1 个样本"));
  }
}
