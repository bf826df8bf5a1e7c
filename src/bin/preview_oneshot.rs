// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/preview_oneshot.rs - 预览单个样本的流水线输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_pipe::{
  FromUrl,
  config::PipelineConfig,
  dataset::{Dataset, JsonDataset},
  task::OneShotTask,
};
use tracing::info;

/// Shanan 流水线预览参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集地址
  #[arg(long, value_name = "DATA")]
  pub data: Url,
  /// 流水线配置文件
  #[arg(long, value_name = "FILE")]
  pub pipeline: PathBuf,
  /// 打印输出的 JSON 形式
  #[arg(long)]
  pub json: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("数据集: {}", args.data);
  info!("流水线配置: {}", args.pipeline.display());

  let items = JsonDataset::from_url(&args.data)?.load_data()?;
  let pipeline = PipelineConfig::from_path(&args.pipeline)?.build()?;

  let output = OneShotTask.preview(&items, &pipeline)?;
  if args.json {
    println!("{}", serde_json::to_string_pretty(&output.to_json())?);
  }

  Ok(())
}
