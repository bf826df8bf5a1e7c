// 该文件是 Shanan （山南西风） 项目的一部分。
// src/processor/standard.rs - 标准处理器
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
use std::fmt;

use ndarray::{ArrayD, Axis, Ix2, concatenate, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  boxes::{CLASS_COLUMN, to_one_hot},
  model::Model,
  processor::{Contract, Processor, ProcessorError},
  topics::Topics,
  value::{Kind, Value},
};

/// `OutputSelector` 输出中输入部分的主题名
pub const INPUTS_TOPIC: &str = "inputs";
/// `OutputSelector` 输出中标签部分的主题名
pub const LABELS_TOPIC: &str = "labels";

/// 调用模型预测，可选地在前后接上预处理与后处理
pub struct Predict<M> {
  model: M,
  preprocess: Option<Box<dyn Processor>>,
  postprocess: Option<Box<dyn Processor>>,
}

impl<M: Model> Predict<M> {
  pub fn new(model: M) -> Self {
    Self {
      model,
      preprocess: None,
      postprocess: None,
    }
  }

  pub fn with_preprocess(mut self, preprocess: impl Processor + 'static) -> Self {
    self.preprocess = Some(Box::new(preprocess));
    self
  }

  pub fn with_postprocess(mut self, postprocess: impl Processor + 'static) -> Self {
    self.postprocess = Some(Box::new(postprocess));
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }
}

impl<M: Model> Processor for Predict<M> {
  fn contract(&self) -> Contract {
    let input = self
      .preprocess
      .as_ref()
      .map_or(Kind::Any, |p| p.contract().input);
    let output = self
      .postprocess
      .as_ref()
      .map_or(Kind::Any, |p| p.contract().output);
    Contract::value(input, output)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let x = match &self.preprocess {
      Some(preprocess) => preprocess.process(value)?,
      None => value,
    };
    let y = self
      .model
      .predict(&x)
      .map_err(|e| ProcessorError::Model {
        processor: self.name().to_string(),
        source: Box::new(e),
      })?;
    match &self.postprocess {
      Some(postprocess) => postprocess.process(y),
      None => Ok(y),
    }
  }
}

/// 取得分最高的类别名称，得分相同时取第一个，得分含 NaN 时报错
#[derive(Debug, Clone)]
pub struct ToClassName {
  labels: Vec<String>,
}

impl ToClassName {
  pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }
}

impl Processor for ToClassName {
  fn contract(&self) -> Contract {
    Contract::value(Kind::Tensor, Kind::Text)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let scores = value.into_tensor(self.name())?;
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
      if score.is_nan() {
        return Err(ProcessorError::invalid_value(
          self.name(),
          format!("第 {} 个得分为 NaN", index),
        ));
      }
      match best {
        Some((_, best_score)) if score <= best_score => {}
        _ => best = Some((index, score)),
      }
    }
    let (index, _) =
      best.ok_or_else(|| ProcessorError::shape(self.name(), "非空得分向量", "空张量"))?;
    self
      .labels
      .get(index)
      .map(|label| Value::Text(label.clone()))
      .ok_or_else(|| {
        ProcessorError::out_of_range(self.name(), index as i64, 0, self.labels.len() as i64)
      })
  }
}

/// 在指定位置插入长度为 1 的轴，负数轴从末尾计数
#[derive(Debug, Clone)]
pub struct ExpandDims {
  axis: isize,
}

impl ExpandDims {
  pub fn new(axis: isize) -> Self {
    Self { axis }
  }

  pub fn axis(&self) -> isize {
    self.axis
  }
}

impl Processor for ExpandDims {
  fn contract(&self) -> Contract {
    Contract::value(Kind::Tensor, Kind::Tensor)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let tensor = value.into_tensor(self.name())?;
    expand_dims(self.name(), tensor, self.axis).map(Value::Tensor)
  }
}

pub(crate) fn expand_dims(
  name: &str,
  tensor: ArrayD<f32>,
  axis: isize,
) -> Result<ArrayD<f32>, ProcessorError> {
  // 插入后共有 ndim + 1 个合法位置
  let slots = tensor.ndim() as isize + 1;
  let position = if axis < 0 { axis + slots } else { axis };
  if !(0..slots).contains(&position) {
    return Err(ProcessorError::shape(
      name,
      format!("轴位于 [{}, {}]", -slots, slots - 1),
      format!("轴 {}", axis),
    ));
  }
  Ok(tensor.insert_axis(Axis(position as usize)))
}

/// 去掉指定的长度为 1 的轴，未指定轴时去掉所有长度为 1 的轴
pub(crate) fn squeeze(
  name: &str,
  mut tensor: ArrayD<f32>,
  axes: &[isize],
) -> Result<ArrayD<f32>, ProcessorError> {
  let ndim = tensor.ndim() as isize;
  let mut positions = BTreeSet::new();
  if axes.is_empty() {
    positions.extend((0..tensor.ndim()).filter(|&i| tensor.shape()[i] == 1));
  }
  for &axis in axes {
    let position = if axis < 0 { axis + ndim } else { axis };
    if !(0..ndim).contains(&position) {
      return Err(ProcessorError::shape(
        name,
        format!("轴位于 [{}, {})", -ndim, ndim),
        format!("轴 {}", axis),
      ));
    }
    let position = position as usize;
    if tensor.shape()[position] != 1 {
      return Err(ProcessorError::shape(
        name,
        format!("轴 {} 长度为 1", axis),
        format!("形状 {:?}", tensor.shape()),
      ));
    }
    if !positions.insert(position) {
      return Err(ProcessorError::invalid_parameter(
        name,
        format!("重复的轴 {}", axis),
      ));
    }
  }
  // 从后往前移除，保证前面的轴序号不变
  for position in positions.into_iter().rev() {
    tensor = tensor.remove_axis(Axis(position));
  }
  Ok(tensor)
}

/// 将边界框第 5 列的类别索引替换为独热向量
///
/// 输入每行为 `[x_min, y_min, x_max, y_max, class, ...]`，
/// 输出每行为 `[x_min, y_min, x_max, y_max, one_hot...]`。
#[derive(Debug, Clone)]
pub struct BoxClassToOneHotVector {
  num_classes: usize,
}

impl BoxClassToOneHotVector {
  pub fn new(num_classes: usize) -> Self {
    Self { num_classes }
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }
}

impl Processor for BoxClassToOneHotVector {
  fn contract(&self) -> Contract {
    Contract::value(Kind::Tensor, Kind::Tensor)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let tensor = value.into_tensor(self.name())?;
    let got = format!("形状 {:?}", tensor.shape());
    let boxes = tensor
      .into_dimensionality::<Ix2>()
      .map_err(|_| ProcessorError::shape(self.name(), "二维边界框数组", &got))?;
    if boxes.ncols() <= CLASS_COLUMN {
      return Err(ProcessorError::shape(
        self.name(),
        format!("至少 {} 列", CLASS_COLUMN + 1),
        got,
      ));
    }

    let mut indices = Vec::with_capacity(boxes.nrows());
    for &class in boxes.column(CLASS_COLUMN) {
      if class.is_nan() {
        return Err(ProcessorError::invalid_value(self.name(), "类别索引为 NaN"));
      }
      // 与整数转换一致，向零截断；无穷大饱和后必然越界
      indices.push(class.trunc() as i64);
    }

    let one_hot = to_one_hot(&indices, self.num_classes).map_err(|e| {
      ProcessorError::out_of_range(self.name(), e.index, 0, e.num_classes as i64)
    })?;
    debug!("{} 个边界框编码为 {} 类独热向量", indices.len(), self.num_classes);

    let encoded = concatenate(
      Axis(1),
      &[boxes.slice(s![.., ..CLASS_COLUMN]), one_hot.view()],
    )
    .map_err(|e| ProcessorError::shape(self.name(), "行数一致", e))?;
    Ok(Value::Tensor(encoded.into_dyn()))
  }
}

/// 按输入主题与标签主题划分数据
///
/// 输出为 `{inputs: {...}, labels: {...}}`，未列出的主题被丢弃。
#[derive(Debug, Clone)]
pub struct OutputSelector {
  input_topics: Vec<String>,
  label_topics: Vec<String>,
}

impl OutputSelector {
  pub fn new<S: Into<String>>(
    input_topics: impl IntoIterator<Item = S>,
    label_topics: impl IntoIterator<Item = S>,
  ) -> Result<Self, ProcessorError> {
    let input_topics: Vec<String> = input_topics.into_iter().map(Into::into).collect();
    let label_topics: Vec<String> = label_topics.into_iter().map(Into::into).collect();

    let mut seen = BTreeSet::new();
    for topic in input_topics.iter().chain(&label_topics) {
      if !seen.insert(topic.as_str()) {
        return Err(ProcessorError::invalid_parameter(
          "OutputSelector",
          format!("主题 `{}` 重复出现", topic),
        ));
      }
    }

    Ok(Self {
      input_topics,
      label_topics,
    })
  }

  pub fn input_topics(&self) -> &[String] {
    &self.input_topics
  }

  pub fn label_topics(&self) -> &[String] {
    &self.label_topics
  }

  fn select(&self, topics: &mut Topics, wanted: &[String]) -> Result<Topics, ProcessorError> {
    let mut selected = Topics::new();
    for topic in wanted {
      selected.insert(topic.as_str(), topics.take(self.name(), topic)?);
    }
    Ok(selected)
  }
}

impl Processor for OutputSelector {
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads(self.input_topics.iter().chain(&self.label_topics).cloned())
      .writes([INPUTS_TOPIC, LABELS_TOPIC])
      .replacing()
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let inputs = self.select(&mut topics, &self.input_topics)?;
    let labels = self.select(&mut topics, &self.label_topics)?;
    if !topics.is_empty() {
      debug!("丢弃未选择的主题: {:?}", topics.keys().collect::<Vec<_>>());
    }
    Ok(Value::Topics(
      Topics::new()
        .with(INPUTS_TOPIC, inputs)
        .with(LABELS_TOPIC, labels),
    ))
  }
}

/// `SelectElement` 的取值参数：序号或键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
  Index(isize),
  Key(String),
}

impl From<isize> for Selector {
  fn from(index: isize) -> Self {
    Selector::Index(index)
  }
}

impl From<&str> for Selector {
  fn from(key: &str) -> Self {
    Selector::Key(key.to_string())
  }
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Selector::Index(index) => write!(f, "[{}]", index),
      Selector::Key(key) => write!(f, "[{:?}]", key),
    }
  }
}

/// 将主题替换为其中的一个元素
#[derive(Debug, Clone)]
pub struct SelectElement {
  topic: String,
  argument: Selector,
}

impl SelectElement {
  pub fn new(topic: impl Into<String>, argument: impl Into<Selector>) -> Self {
    Self {
      topic: topic.into(),
      argument: argument.into(),
    }
  }
}

impl Processor for SelectElement {
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads([self.topic.as_str()])
      .writes([self.topic.as_str()])
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let target = topics.take(self.name(), &self.topic)?;
    let selected = select(self.name(), target, &self.argument)?;
    topics.insert(self.topic.as_str(), selected);
    Ok(Value::Topics(topics))
  }
}

fn select(name: &str, value: Value, argument: &Selector) -> Result<Value, ProcessorError> {
  match (value, argument) {
    (Value::Tensor(tensor), Selector::Index(index)) => {
      if tensor.ndim() == 0 {
        return Err(ProcessorError::shape(name, "至少一维的张量", "零维张量"));
      }
      let position = resolve_index(name, *index, tensor.shape()[0])?;
      let selected = tensor.index_axis_move(Axis(0), position);
      if selected.ndim() == 0 {
        let x = selected.first().copied().unwrap_or(f32::NAN);
        Ok(Value::Scalar(x as f64))
      } else {
        Ok(Value::Tensor(selected))
      }
    }
    (Value::List(mut items), Selector::Index(index)) => {
      let position = resolve_index(name, *index, items.len())?;
      Ok(items.swap_remove(position))
    }
    (Value::Topics(mut topics), Selector::Key(key)) => topics.take(name, key),
    (other, Selector::Index(_)) => Err(ProcessorError::type_mismatch(
      name,
      Kind::Tensor,
      other.kind(),
    )),
    (other, Selector::Key(_)) => Err(ProcessorError::type_mismatch(
      name,
      Kind::Topics,
      other.kind(),
    )),
  }
}

fn resolve_index(name: &str, index: isize, len: usize) -> Result<usize, ProcessorError> {
  let len = len as i64;
  let index = index as i64;
  let position = if index < 0 { index + len } else { index };
  if (0..len).contains(&position) {
    Ok(position as usize)
  } else {
    Err(ProcessorError::out_of_range(name, index, -len, len))
  }
}

/// 去掉主题中长度为 1 的轴
#[derive(Debug, Clone)]
pub struct Squeeze {
  axes: Vec<isize>,
  topic: String,
}

impl Squeeze {
  pub fn new(axis: isize, topic: impl Into<String>) -> Self {
    Self::with_axes([axis], topic)
  }

  pub fn with_axes(axes: impl IntoIterator<Item = isize>, topic: impl Into<String>) -> Self {
    Self {
      axes: axes.into_iter().collect(),
      topic: topic.into(),
    }
  }
}

impl Processor for Squeeze {
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads([self.topic.as_str()])
      .writes([self.topic.as_str()])
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let tensor = topics.take(self.name(), &self.topic)?.into_tensor(self.name())?;
    let squeezed = squeeze(self.name(), tensor, &self.axes)?;
    topics.insert(self.topic.as_str(), squeezed);
    Ok(Value::Topics(topics))
  }
}

/// 将一个主题的值深拷贝到另一个主题
#[derive(Debug, Clone)]
pub struct Copy {
  input_topic: String,
  label_topic: String,
}

impl Copy {
  pub fn new(input_topic: impl Into<String>, label_topic: impl Into<String>) -> Self {
    Self {
      input_topic: input_topic.into(),
      label_topic: label_topic.into(),
    }
  }
}

impl Processor for Copy {
  fn contract(&self) -> Contract {
    Contract::topics()
      .reads([self.input_topic.as_str()])
      .writes([self.label_topic.as_str()])
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let mut topics = value.into_topics(self.name())?;
    let copied = topics.require(self.name(), &self.input_topic)?.clone();
    topics.insert(self.label_topic.as_str(), copied);
    Ok(Value::Topics(topics))
  }
}
