// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Shanan 流水线参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集地址，例如 json:///data/train.json
  #[arg(long, value_name = "DATA")]
  pub data: Url,

  /// 验证集地址，每隔若干轮用同一流水线完整遍历一次
  #[arg(long, value_name = "DATA")]
  pub val_data: Option<Url>,

  /// 验证频率：每多少轮验证一次
  #[arg(long, default_value = "1", value_name = "EPOCHS")]
  pub eval_per_epoch: usize,

  /// 流水线配置文件（JSON），缺省时使用检测任务的默认流水线
  #[arg(long, value_name = "FILE")]
  pub pipeline: Option<PathBuf>,

  /// 默认流水线的类别数
  #[arg(long, default_value = "80", value_name = "COUNT")]
  pub num_classes: usize,

  /// 默认流水线中作为输入的主题
  #[arg(long, value_delimiter = ',', default_value = "image", value_name = "TOPICS")]
  pub input_topics: Vec<String>,

  /// 默认流水线中作为标签的主题
  #[arg(long, value_delimiter = ',', default_value = "boxes", value_name = "TOPICS")]
  pub label_topics: Vec<String>,

  /// 批大小
  #[arg(long, default_value = "8", value_name = "SIZE")]
  pub batch_size: usize,

  /// 工作线程数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub workers: usize,

  /// 遍历轮数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub epochs: usize,

  /// 每轮最多批数（缺省时遍历全部样本）
  #[arg(long, value_name = "COUNT")]
  pub steps_per_epoch: Option<usize>,

  /// 跳过处理失败的样本，而不是终止
  #[arg(long)]
  pub skip_failed: bool,
}
