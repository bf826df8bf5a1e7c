// 该文件是 Shanan （山南西风） 项目的一部分。
// src/topics.rs - 主题映射
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

use std::collections::BTreeMap;

use crate::{processor::ProcessorError, value::Value};

/// 主题映射：主题名到数据值
///
/// 每个样本独占一份映射，按值在处理器之间传递。
/// 读取主题的处理器要求主题已存在，写入主题的处理器可以新建或覆盖。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topics {
  inner: BTreeMap<String, Value>,
}

impl Topics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, topic: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(topic, value);
    self
  }

  pub fn get(&self, topic: &str) -> Option<&Value> {
    self.inner.get(topic)
  }

  pub fn get_mut(&mut self, topic: &str) -> Option<&mut Value> {
    self.inner.get_mut(topic)
  }

  /// 读取处理器声明需要的主题
  pub fn require(&self, processor: &str, topic: &str) -> Result<&Value, ProcessorError> {
    self
      .inner
      .get(topic)
      .ok_or_else(|| ProcessorError::missing_topic(processor, topic))
  }

  /// 取出处理器声明需要的主题
  pub fn take(&mut self, processor: &str, topic: &str) -> Result<Value, ProcessorError> {
    self
      .inner
      .remove(topic)
      .ok_or_else(|| ProcessorError::missing_topic(processor, topic))
  }

  pub fn insert(&mut self, topic: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    self.inner.insert(topic.into(), value.into())
  }

  pub fn remove(&mut self, topic: &str) -> Option<Value> {
    self.inner.remove(topic)
  }

  pub fn contains(&self, topic: &str) -> bool {
    self.inner.contains_key(topic)
  }

  pub fn len(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.inner.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.inner.iter().map(|(topic, value)| (topic.as_str(), value))
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Topics {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      inner: iter
        .into_iter()
        .map(|(topic, value)| (topic.into(), value.into()))
        .collect(),
    }
  }
}

impl IntoIterator for Topics {
  type Item = (String, Value);
  type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

  fn into_iter(self) -> Self::IntoIter {
    self.inner.into_iter()
  }
}
