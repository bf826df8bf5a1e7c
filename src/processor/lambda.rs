// 该文件是 Shanan （山南西风） 项目的一部分。
// src/processor/lambda.rs - 函数与主题适配器
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

use crate::{
  processor::{Contract, Processor, ProcessorError},
  value::Value,
};

/// 将任意函数与固定参数包装为主题处理器：
/// `topics[topic] = function(topics[topic], &parameters)`
///
/// 函数只能依赖传入的值与固定参数，不得读写全局状态，
/// 否则同一输入重复运行流水线的结果将不再一致。
pub struct Lambda<F, P> {
  function: F,
  parameters: P,
  topic: String,
}

impl<F, P> Lambda<F, P>
where
  F: Fn(Value, &P) -> Result<Value, ProcessorError> + Send + Sync,
  P: Send + Sync,
{
  pub fn new(function: F, parameters: P, topic: impl Into<String>) -> Self {
    Self {
      function,
      parameters,
      topic: topic.into(),
    }
  }

  pub fn parameters(&self) -> &P {
    &self.parameters
  }
}

impl<F, P> Processor for Lambda<F, P>
where
  F: Fn(Value, &P) -> Result<Value, ProcessorError> + Send + Sync,
  P: Send + Sync,
{
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads([self.topic.as_str()])
      .writes([self.topic.as_str()])
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let data = topics.take(self.name(), &self.topic)?;
    let data = (self.function)(data, &self.parameters)?;
    topics.insert(self.topic.as_str(), data);
    Ok(Value::Topics(topics))
  }
}

/// 在单个主题上运行位置参数处理器：`topics[topic] = inner(topics[topic])`
pub struct OnTopic<P> {
  topic: String,
  inner: P,
}

impl<P: Processor> OnTopic<P> {
  pub fn new(topic: impl Into<String>, inner: P) -> Self {
    Self {
      topic: topic.into(),
      inner,
    }
  }

  pub fn inner(&self) -> &P {
    &self.inner
  }
}

impl<P: Processor> Processor for OnTopic<P> {
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads([self.topic.as_str()])
      .writes([self.topic.as_str()])
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let data = topics.take(self.name(), &self.topic)?;
    topics.insert(self.topic.as_str(), self.inner.process(data)?);
    Ok(Value::Topics(topics))
  }
}
