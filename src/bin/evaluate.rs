// 该文件是 Voxtile （体素分片） 项目的一部分。
// src/bin/evaluate.rs - 分块推理评估程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use voxtile::{
  Concurrency, FromUrl, TilingConfig,
  input::InputWrapper,
  model::IdentityModel,
  observer::TracingObserver,
  task::{EvaluateTask, Task},
};

/// Voxtile 评估参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL", default_value = "identity://")]
  pub model: Url,
  /// 输入来源，可重复指定
  /// 支持格式:
  /// - npy:///image.npy?label=/label.npy&domain=0
  /// - phantom://?shape=64x64x48&classes=8&count=2
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,
  /// 分块边长
  #[arg(long, default_value = "32", value_name = "SIZE")]
  pub tile_size: usize,
  /// 分块步长
  #[arg(long, default_value = "32", value_name = "SIZE")]
  pub stride: usize,
  /// 模型输入通道数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub channels: usize,
  /// 类别数
  #[arg(long, default_value = "8", value_name = "COUNT")]
  pub classes: usize,
  /// 并行推理各分块
  #[arg(long)]
  pub parallel: bool,
  /// 最大处理样本数
  #[arg(long, value_name = "COUNT")]
  pub max_samples: Option<usize>,
  /// 响应 Ctrl-C 中断
  #[arg(long)]
  pub interrupt: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  for input in &args.input {
    info!("输入来源: {}", input);
  }
  info!(
    "分块边长 {}, 步长 {}, 通道数 {}, 类别数 {}",
    args.tile_size, args.stride, args.channels, args.classes
  );

  let concurrency = if args.parallel {
    Concurrency::Parallel
  } else {
    Concurrency::Sequential
  };
  let config = TilingConfig::new(args.tile_size, args.stride)
    .with_channels(args.channels)
    .with_concurrency(concurrency);

  let model = IdentityModel::from_url(&args.model).context("无法创建模型")?;
  let inputs = args
    .input
    .iter()
    .map(|url| InputWrapper::from_url(url).with_context(|| format!("无法打开输入 {}", url)))
    .collect::<Result<Vec<_>>>()?;

  let evaluation = EvaluateTask::new(config)
    .with_class_count(args.classes)
    .with_sample_limit(args.max_samples)
    .with_interrupt(args.interrupt)
    .run_task(inputs.into_iter().flatten(), model, TracingObserver)?;

  info!("共评估 {} 个样本", evaluation.sample_count());
  Ok(())
}
