// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 处理器流水线
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

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  processor::{Contract, Processor, ProcessorError},
  value::{Kind, Value},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
  #[error("第 {stage} 级 {processor}: 输入类型不兼容, 期望 {expected}, 实际 {got}")]
  Incompatible {
    stage: usize,
    processor: String,
    expected: Kind,
    got: Kind,
  },
  #[error("第 {stage} 级 {processor}: 缺少主题 `{topic}`")]
  MissingTopic {
    stage: usize,
    processor: String,
    topic: String,
  },
}

/// 流水线在某一级的数据形态
///
/// `topics` 为 `None` 表示主题集合未知，此时跳过主题检查。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
  kind: Kind,
  topics: Option<BTreeSet<String>>,
}

impl Schema {
  pub fn value(kind: Kind) -> Self {
    Self { kind, topics: None }
  }

  pub fn topics<S: Into<String>>(topics: impl IntoIterator<Item = S>) -> Self {
    Self {
      kind: Kind::Topics,
      topics: Some(topics.into_iter().map(Into::into).collect()),
    }
  }

  /// 由样本推导数据形态
  pub fn of(value: &Value) -> Self {
    match value {
      Value::Topics(topics) => Self::topics(topics.keys()),
      other => Self::value(other.kind()),
    }
  }

  pub fn kind(&self) -> Kind {
    self.kind
  }

  pub fn has_topic(&self, topic: &str) -> Option<bool> {
    self.topics.as_ref().map(|topics| topics.contains(topic))
  }

  fn apply(&self, stage: usize, name: &str, contract: &Contract) -> Result<Schema, PipelineError> {
    if !contract.input.accepts(self.kind) {
      return Err(PipelineError::Incompatible {
        stage,
        processor: name.to_string(),
        expected: contract.input,
        got: self.kind,
      });
    }

    if let Some(topics) = &self.topics {
      if let Some(topic) = contract.reads.iter().find(|topic| !topics.contains(*topic)) {
        return Err(PipelineError::MissingTopic {
          stage,
          processor: name.to_string(),
          topic: topic.clone(),
        });
      }
    }

    let topics = match contract.output {
      Kind::Topics if contract.replaces => Some(contract.writes.iter().cloned().collect()),
      Kind::Topics => self.topics.clone().map(|mut topics: BTreeSet<String>| {
        topics.extend(contract.writes.iter().cloned());
        topics
      }),
      _ => None,
    };
    Ok(Schema {
      kind: contract.output,
      topics,
    })
  }
}

/// 按声明顺序依次执行的处理器序列
#[derive(Default)]
pub struct Pipeline {
  stages: Vec<Box<dyn Processor>>,
}

impl Pipeline {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(mut self, processor: impl Processor + 'static) -> Self {
    self.stages.push(Box::new(processor));
    self
  }

  pub fn push(&mut self, processor: Box<dyn Processor>) {
    self.stages.push(processor);
  }

  pub fn len(&self) -> usize {
    self.stages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  pub fn names(&self) -> Vec<&str> {
    self.stages.iter().map(|stage| stage.name()).collect()
  }

  /// 按处理器契约逐级检查流水线，返回最终的数据形态
  pub fn validate(&self, input: &Schema) -> Result<Schema, PipelineError> {
    let mut schema = input.clone();
    for (stage, processor) in self.stages.iter().enumerate() {
      schema = schema.apply(stage, processor.name(), &processor.contract())?;
    }
    Ok(schema)
  }
}

impl Processor for Pipeline {
  fn contract(&self) -> Contract {
    let contracts: Vec<Contract> = self.stages.iter().map(|stage| stage.contract()).collect();
    let (Some(first), Some(last)) = (contracts.first(), contracts.last()) else {
      return Contract::default();
    };

    let mut reads = Vec::new();
    let mut written = BTreeSet::new();
    // 主题集合被替换后，后续读取不再依赖外部输入
    let mut detached = false;
    for contract in &contracts {
      if !detached {
        for topic in &contract.reads {
          if !written.contains(topic) && !reads.contains(topic) {
            reads.push(topic.clone());
          }
        }
      }
      if contract.replaces || !matches!(contract.output, Kind::Topics | Kind::Any) {
        written.clear();
        detached = true;
      }
      written.extend(contract.writes.iter().cloned());
    }

    Contract {
      input: first.input,
      output: last.output,
      reads,
      writes: written.into_iter().collect(),
      replaces: detached,
    }
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut value = value;
    for (stage, processor) in self.stages.iter().enumerate() {
      debug!("第 {} 级 {}: 输入 {}", stage, processor.name(), value.describe());
      value = processor.process(value).inspect_err(|e| {
        error!("第 {} 级 {} 处理失败: {}", stage, processor.name(), e);
      })?;
    }
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    processor::{BoxClassToOneHotVector, Copy, ExpandDims, OnTopic, OutputSelector, Squeeze},
    topics::Topics,
  };
  use ndarray::{Array1, array};

  fn detection_pipeline() -> Pipeline {
    Pipeline::new()
      .add(OnTopic::new("boxes", BoxClassToOneHotVector::new(3)))
      .add(Copy::new("image", "target"))
      .add(OutputSelector::new(["image"], ["boxes", "target"]).unwrap())
  }

  fn item() -> Value {
    Value::Topics(
      Topics::new()
        .with("image", array![1.0f32, 2.0, 3.0])
        .with("boxes", array![[0.0f32, 0.0, 1.0, 1.0, 2.0]]),
    )
  }

  #[test]
  fn stages_run_in_order() {
    let pipeline = Pipeline::new().add(ExpandDims::new(0)).add(ExpandDims::new(-1));
    let out = pipeline.process(Value::from(Array1::<f32>::zeros(4))).unwrap();
    assert_eq!(out.as_tensor().unwrap().shape(), &[1, 4, 1]);
    assert_eq!(pipeline.names(), ["ExpandDims", "ExpandDims"]);
  }

  #[test]
  fn empty_pipeline_is_identity() {
    let pipeline = Pipeline::new();
    assert!(pipeline.is_empty());
    assert_eq!(pipeline.process(item()).unwrap(), item());
  }

  #[test]
  fn first_error_aborts_item() {
    let pipeline = Pipeline::new()
      .add(Squeeze::new(0, "missing"))
      .add(ExpandDims::new(0));
    let err = pipeline.process(item()).unwrap_err();
    assert!(matches!(err, ProcessorError::MissingTopic { .. }));
  }

  #[test]
  fn repeated_runs_are_deterministic() {
    let pipeline = detection_pipeline();
    let first = pipeline.process(item()).unwrap();
    let second = pipeline.process(item()).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn validate_accepts_matching_topics() {
    let schema = detection_pipeline()
      .validate(&Schema::topics(["image", "boxes"]))
      .unwrap();
    assert_eq!(schema.kind(), Kind::Topics);
    assert_eq!(schema.has_topic("inputs"), Some(true));
    assert_eq!(schema.has_topic("image"), Some(false));
  }

  #[test]
  fn validate_reports_missing_topic_before_running() {
    let err = detection_pipeline()
      .validate(&Schema::topics(["image"]))
      .unwrap_err();
    assert_eq!(
      err,
      PipelineError::MissingTopic {
        stage: 0,
        processor: "OnTopic".to_string(),
        topic: "boxes".to_string(),
      }
    );
  }

  #[test]
  fn validate_reports_incompatible_kind() {
    let pipeline = Pipeline::new()
      .add(ExpandDims::new(0))
      .add(Squeeze::new(0, "image"));
    let err = pipeline.validate(&Schema::value(Kind::Tensor)).unwrap_err();
    assert!(matches!(
      err,
      PipelineError::Incompatible {
        stage: 1,
        expected: Kind::Topics,
        got: Kind::Tensor,
        ..
      }
    ));
  }

  #[test]
  fn nested_pipeline_contract_is_folded() {
    let contract = detection_pipeline().contract();
    assert_eq!(contract.input, Kind::Topics);
    assert_eq!(contract.reads, ["boxes", "image"]);
    assert_eq!(contract.writes, ["inputs", "labels"]);
    assert!(contract.replaces);

    let outer = Pipeline::new().add(detection_pipeline());
    assert!(outer.validate(&Schema::topics(["image", "boxes"])).is_ok());
    assert!(outer.validate(&Schema::topics(["image"])).is_err());
  }
}
