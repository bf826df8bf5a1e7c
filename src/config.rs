// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 流水线配置文件
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  pipeline::Pipeline,
  processor::{
    BoxClassToOneHotVector, Copy, ExpandDims, OnTopic, OutputSelector, Processor,
    ProcessorError, SelectElement, Selector, Squeeze, ToClassName,
  },
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("处理器参数错误: {0}")]
  Processor(#[from] ProcessorError),
}

/// 单个轴或一组轴
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Axes {
  One(isize),
  Many(Vec<isize>),
}

/// 流水线中一级处理器的配置
///
/// 位置参数处理器可附带 `topic`，此时在该主题上运行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
  ExpandDims {
    axis: isize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
  },
  Squeeze {
    axis: Axes,
    topic: String,
  },
  ToClassName {
    labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
  },
  BoxClassToOneHotVector {
    num_classes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
  },
  OutputSelector {
    input_topics: Vec<String>,
    label_topics: Vec<String>,
  },
  SelectElement {
    topic: String,
    argument: Selector,
  },
  Copy {
    input_topic: String,
    label_topic: String,
  },
  #[cfg(feature = "image")]
  LoadImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
  },
  #[cfg(feature = "image")]
  ResizeImage {
    width: u32,
    height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
  },
}

fn on_topic(topic: &Option<String>, processor: impl Processor + 'static) -> Box<dyn Processor> {
  match topic {
    Some(topic) => Box::new(OnTopic::new(topic.as_str(), processor)),
    None => Box::new(processor),
  }
}

impl StageConfig {
  pub fn build(&self) -> Result<Box<dyn Processor>, ConfigError> {
    let processor: Box<dyn Processor> = match self {
      StageConfig::ExpandDims { axis, topic } => on_topic(topic, ExpandDims::new(*axis)),
      StageConfig::Squeeze { axis, topic } => match axis {
        Axes::One(axis) => Box::new(Squeeze::new(*axis, topic.as_str())),
        Axes::Many(axes) => Box::new(Squeeze::with_axes(axes.iter().copied(), topic.as_str())),
      },
      StageConfig::ToClassName { labels, topic } => {
        on_topic(topic, ToClassName::new(labels.iter().cloned()))
      }
      StageConfig::BoxClassToOneHotVector { num_classes, topic } => {
        on_topic(topic, BoxClassToOneHotVector::new(*num_classes))
      }
      StageConfig::OutputSelector {
        input_topics,
        label_topics,
      } => Box::new(OutputSelector::new(
        input_topics.iter().cloned(),
        label_topics.iter().cloned(),
      )?),
      StageConfig::SelectElement { topic, argument } => {
        Box::new(SelectElement::new(topic.as_str(), argument.clone()))
      }
      StageConfig::Copy {
        input_topic,
        label_topic,
      } => Box::new(Copy::new(input_topic.as_str(), label_topic.as_str())),
      #[cfg(feature = "image")]
      StageConfig::LoadImage { topic } => on_topic(topic, crate::processor::LoadImage::new()),
      #[cfg(feature = "image")]
      StageConfig::ResizeImage {
        width,
        height,
        topic,
      } => on_topic(topic, crate::processor::ResizeImage::new(*width, *height)),
    };
    Ok(processor)
  }
}

/// 流水线配置：按顺序排列的处理器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取流水线配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn to_json_string(&self) -> Result<String, ConfigError> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// 检测任务的默认流水线：框类别转独热向量，再划分输入与标签
  pub fn detection(
    num_classes: usize,
    input_topics: Vec<String>,
    label_topics: Vec<String>,
  ) -> Self {
    Self {
      stages: vec![
        StageConfig::BoxClassToOneHotVector {
          num_classes,
          topic: Some("boxes".to_string()),
        },
        StageConfig::OutputSelector {
          input_topics,
          label_topics,
        },
      ],
    }
  }

  pub fn build(&self) -> Result<Pipeline, ConfigError> {
    let mut pipeline = Pipeline::new();
    for stage in &self.stages {
      let processor = stage.build()?;
      debug!("添加处理器: {}", processor.name());
      pipeline.push(processor);
    }
    info!("流水线共 {} 级: {:?}", pipeline.len(), pipeline.names());
    Ok(pipeline)
  }
}
