// 该文件是 Shanan （山南西风） 项目的一部分。
// src/processor.rs - 处理器抽象
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

use std::fmt::Display;

use thiserror::Error;

use crate::value::{Kind, Value};

#[derive(Error, Debug)]
pub enum ProcessorError {
  #[error("{processor}: 缺少主题 `{topic}`")]
  MissingTopic { processor: String, topic: String },
  #[error("{processor}: 形状不匹配, 期望 {expected}, 实际 {got}")]
  ShapeMismatch {
    processor: String,
    expected: String,
    got: String,
  },
  #[error("{processor}: 索引 {index} 超出范围 [{lower}, {upper})")]
  IndexOutOfRange {
    processor: String,
    index: i64,
    lower: i64,
    upper: i64,
  },
  #[error("{processor}: 类型不匹配, 期望 {expected}, 实际 {got}")]
  TypeMismatch {
    processor: String,
    expected: Kind,
    got: Kind,
  },
  #[error("{processor}: 数值无效: {reason}")]
  InvalidValue { processor: String, reason: String },
  #[error("{processor}: 参数无效: {reason}")]
  InvalidParameter { processor: String, reason: String },
  #[error("{processor}: 模型预测失败: {source}")]
  Model {
    processor: String,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("{processor}: 函数执行失败: {reason}")]
  Function { processor: String, reason: String },
  #[cfg(feature = "image")]
  #[error("{processor}: 图像错误: {source}")]
  Image {
    processor: String,
    source: ::image::ImageError,
  },
}

impl ProcessorError {
  pub fn missing_topic(processor: &str, topic: &str) -> Self {
    ProcessorError::MissingTopic {
      processor: processor.to_string(),
      topic: topic.to_string(),
    }
  }

  pub fn shape(processor: &str, expected: impl Display, got: impl Display) -> Self {
    ProcessorError::ShapeMismatch {
      processor: processor.to_string(),
      expected: expected.to_string(),
      got: got.to_string(),
    }
  }

  pub fn out_of_range(processor: &str, index: i64, lower: i64, upper: i64) -> Self {
    ProcessorError::IndexOutOfRange {
      processor: processor.to_string(),
      index,
      lower,
      upper,
    }
  }

  pub fn type_mismatch(processor: &str, expected: Kind, got: Kind) -> Self {
    ProcessorError::TypeMismatch {
      processor: processor.to_string(),
      expected,
      got,
    }
  }

  pub fn invalid_value(processor: &str, reason: impl Display) -> Self {
    ProcessorError::InvalidValue {
      processor: processor.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn invalid_parameter(processor: &str, reason: impl Display) -> Self {
    ProcessorError::InvalidParameter {
      processor: processor.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn function(processor: &str, reason: impl Display) -> Self {
    ProcessorError::Function {
      processor: processor.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// 处理器的输入输出契约
///
/// `reads` 为处理器读取的主题，`writes` 为写入的主题。
/// `replaces` 为真时，输出的主题集合只包含 `writes`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
  pub input: Kind,
  pub output: Kind,
  pub reads: Vec<String>,
  pub writes: Vec<String>,
  pub replaces: bool,
}

impl Default for Contract {
  fn default() -> Self {
    Self::value(Kind::Any, Kind::Any)
  }
}

impl Contract {
  pub fn value(input: Kind, output: Kind) -> Self {
    Self {
      input,
      output,
      reads: Vec::new(),
      writes: Vec::new(),
      replaces: false,
    }
  }

  pub fn topics() -> Self {
    Self::value(Kind::Topics, Kind::Topics)
  }

  pub fn reads<S: Into<String>>(mut self, topics: impl IntoIterator<Item = S>) -> Self {
    self.reads.extend(topics.into_iter().map(Into::into));
    self
  }

  pub fn writes<S: Into<String>>(mut self, topics: impl IntoIterator<Item = S>) -> Self {
    self.writes.extend(topics.into_iter().map(Into::into));
    self
  }

  pub fn replacing(mut self) -> Self {
    self.replaces = true;
    self
  }
}

/// 处理器：流水线的组合单元
///
/// 处理器只持有构造时给定的不可变参数，可被多个工作线程同时调用。
pub trait Processor: Send + Sync {
  fn name(&self) -> &str {
    short_type_name::<Self>()
  }

  fn contract(&self) -> Contract {
    Contract::default()
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError>;
}

impl<P: Processor + ?Sized> Processor for Box<P> {
  fn name(&self) -> &str {
    (**self).name()
  }

  fn contract(&self) -> Contract {
    (**self).contract()
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    (**self).process(value)
  }
}

/// 去掉模块路径与泛型参数后的类型名
pub fn short_type_name<T: ?Sized>() -> &'static str {
  let full = std::any::type_name::<T>();
  let base = full.split('<').next().unwrap_or(full);
  base.rsplit("::").next().unwrap_or(base)
}

#[cfg(feature = "image")]
mod image_io;
mod lambda;
mod standard;

#[cfg(feature = "image")]
pub use self::image_io::{LoadImage, ResizeImage};
pub use self::lambda::{Lambda, OnTopic};
pub use self::standard::{
  BoxClassToOneHotVector, Copy, ExpandDims, INPUTS_TOPIC, LABELS_TOPIC, OutputSelector, Predict,
  SelectElement, Selector, Squeeze, ToClassName,
};
