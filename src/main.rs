// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use shanan_pipe::{
  FailurePolicy, FromUrl, Schema,
  config::PipelineConfig,
  dataset::{Dataset, JsonDataset},
  task::{EpochTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("数据集: {}", args.data);
  info!("批大小: {}, 工作线程: {}", args.batch_size, args.workers);

  let items = JsonDataset::from_url(&args.data)?.load_data()?;

  let config = match &args.pipeline {
    Some(path) => PipelineConfig::from_path(path)?,
    None => PipelineConfig::detection(
      args.num_classes,
      args.input_topics.clone(),
      args.label_topics.clone(),
    ),
  };
  let pipeline = config.build()?;

  if let Some(first) = items.first() {
    let schema = pipeline.validate(&Schema::of(first))?;
    info!("流水线检查通过，输出种类: {}", schema.kind());
  }

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，当前批次完成后退出...");
      stop.store(true, Ordering::SeqCst);
    })?;
  }

  let policy = if args.skip_failed {
    FailurePolicy::Skip
  } else {
    FailurePolicy::Abort
  };

  let mut task = EpochTask::default()
    .with_batch_size(args.batch_size)
    .with_workers(args.workers)
    .with_policy(policy)
    .with_steps(args.steps_per_epoch)
    .with_epochs(args.epochs)
    .with_stop_flag(stop);

  if let Some(url) = &args.val_data {
    info!("验证集: {}, 每 {} 轮验证一次", url, args.eval_per_epoch);
    let val_items = JsonDataset::from_url(url)?.load_data()?;
    task = task.with_validation(val_items, args.eval_per_epoch);
  }

  task.run_task(items.as_slice(), &pipeline)
}
