// 该文件是 Shanan （山南西风） 项目的一部分。
// src/value.rs - 流水线中流动的数据值
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

use std::fmt;

use ndarray::{Array, ArrayD, ArrayViewD, Dimension, IxDyn};
use serde_json::Value as Json;
use thiserror::Error;

use crate::{processor::ProcessorError, topics::Topics};

/// 值的种类，用于处理器契约检查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  /// 任意种类，契约检查时与所有种类兼容
  Any,
  Tensor,
  Scalar,
  Text,
  List,
  Topics,
}

impl Kind {
  pub fn accepts(self, other: Kind) -> bool {
    self == Kind::Any || other == Kind::Any || self == other
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Kind::Any => "any",
      Kind::Tensor => "tensor",
      Kind::Scalar => "scalar",
      Kind::Text => "text",
      Kind::List => "list",
      Kind::Topics => "topics",
    };
    f.write_str(name)
  }
}

/// 流水线中的数据值
///
/// 位置参数形式的处理器直接处理 `Tensor`、`Text` 等值，
/// 主题形式的处理器处理 `Topics`。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Tensor(ArrayD<f32>),
  Scalar(f64),
  Text(String),
  List(Vec<Value>),
  Topics(Topics),
}

#[derive(Error, Debug)]
pub enum ValueError {
  #[error("不支持 null 值")]
  Null,
}

impl Value {
  pub fn kind(&self) -> Kind {
    match self {
      Value::Tensor(_) => Kind::Tensor,
      Value::Scalar(_) => Kind::Scalar,
      Value::Text(_) => Kind::Text,
      Value::List(_) => Kind::List,
      Value::Topics(_) => Kind::Topics,
    }
  }

  /// 简短描述，用于日志输出
  pub fn describe(&self) -> String {
    match self {
      Value::Tensor(tensor) => format!("tensor{:?}", tensor.shape()),
      Value::Scalar(x) => format!("scalar({})", x),
      Value::Text(text) => format!("text({:?})", text),
      Value::List(items) => format!("list({})", items.len()),
      Value::Topics(topics) => {
        let fields: Vec<String> = topics
          .iter()
          .map(|(topic, value)| format!("{}: {}", topic, value.describe()))
          .collect();
        format!("{{{}}}", fields.join(", "))
      }
    }
  }

  pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
    match self {
      Value::Tensor(tensor) => Some(tensor),
      _ => None,
    }
  }

  pub fn as_topics(&self) -> Option<&Topics> {
    match self {
      Value::Topics(topics) => Some(topics),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Value::Text(text) => Some(text),
      _ => None,
    }
  }

  pub fn into_tensor(self, processor: &str) -> Result<ArrayD<f32>, ProcessorError> {
    match self {
      Value::Tensor(tensor) => Ok(tensor),
      other => Err(ProcessorError::type_mismatch(
        processor,
        Kind::Tensor,
        other.kind(),
      )),
    }
  }

  pub fn into_topics(self, processor: &str) -> Result<Topics, ProcessorError> {
    match self {
      Value::Topics(topics) => Ok(topics),
      other => Err(ProcessorError::type_mismatch(
        processor,
        Kind::Topics,
        other.kind(),
      )),
    }
  }

  pub fn into_text(self, processor: &str) -> Result<String, ProcessorError> {
    match self {
      Value::Text(text) => Ok(text),
      other => Err(ProcessorError::type_mismatch(
        processor,
        Kind::Text,
        other.kind(),
      )),
    }
  }

  pub fn to_json(&self) -> Json {
    match self {
      Value::Tensor(tensor) => tensor_to_json(tensor.view()),
      Value::Scalar(x) => number(*x),
      Value::Text(text) => Json::String(text.clone()),
      Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
      Value::Topics(topics) => Json::Object(
        topics
          .iter()
          .map(|(topic, value)| (topic.to_string(), value.to_json()))
          .collect(),
      ),
    }
  }
}

impl<D: Dimension> From<Array<f32, D>> for Value {
  fn from(tensor: Array<f32, D>) -> Self {
    Value::Tensor(tensor.into_dyn())
  }
}

impl From<f64> for Value {
  fn from(x: f64) -> Self {
    Value::Scalar(x)
  }
}

impl From<&str> for Value {
  fn from(text: &str) -> Self {
    Value::Text(text.to_string())
  }
}

impl From<String> for Value {
  fn from(text: String) -> Self {
    Value::Text(text)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::List(items)
  }
}

impl From<Topics> for Value {
  fn from(topics: Topics) -> Self {
    Value::Topics(topics)
  }
}

impl TryFrom<Json> for Value {
  type Error = ValueError;

  fn try_from(json: Json) -> Result<Self, Self::Error> {
    match json {
      Json::Null => Err(ValueError::Null),
      Json::Bool(flag) => Ok(Value::Scalar(if flag { 1.0 } else { 0.0 })),
      Json::Number(n) => Ok(Value::Scalar(n.as_f64().unwrap_or(f64::NAN))),
      Json::String(text) => Ok(Value::Text(text)),
      Json::Array(items) => {
        if let Some(shape) = array_shape(&items) {
          let mut data = Vec::with_capacity(shape.iter().product());
          items.iter().for_each(|item| flatten_numbers(item, &mut data));
          // 形状由 array_shape 推导，元素数量必然一致
          if let Ok(tensor) = ArrayD::from_shape_vec(IxDyn(&shape), data) {
            return Ok(Value::Tensor(tensor));
          }
        }
        let items = items
          .into_iter()
          .map(Value::try_from)
          .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::List(items))
      }
      Json::Object(fields) => {
        let topics = fields
          .into_iter()
          .map(|(topic, value)| Ok::<_, ValueError>((topic, Value::try_from(value)?)))
          .collect::<Result<Topics, ValueError>>()?;
        Ok(Value::Topics(topics))
      }
    }
  }
}

/// 若数组为规则的数值嵌套数组，返回其形状
fn array_shape(items: &[Json]) -> Option<Vec<usize>> {
  let mut iter = items.iter();
  let inner = match iter.next() {
    Some(first) => numeric_shape(first)?,
    None => Vec::new(),
  };
  for item in iter {
    if numeric_shape(item)? != inner {
      return None;
    }
  }
  let mut shape = vec![items.len()];
  shape.extend(inner);
  Some(shape)
}

fn numeric_shape(json: &Json) -> Option<Vec<usize>> {
  match json {
    Json::Number(_) => Some(Vec::new()),
    Json::Array(items) => array_shape(items),
    _ => None,
  }
}

fn flatten_numbers(json: &Json, out: &mut Vec<f32>) {
  match json {
    Json::Number(n) => out.push(n.as_f64().unwrap_or(f64::NAN) as f32),
    Json::Array(items) => items.iter().for_each(|item| flatten_numbers(item, out)),
    _ => {}
  }
}

fn number(x: f64) -> Json {
  serde_json::Number::from_f64(x)
    .map(Json::Number)
    .unwrap_or(Json::Null)
}

fn tensor_to_json(view: ArrayViewD<'_, f32>) -> Json {
  if view.ndim() == 0 {
    return view.iter().next().map_or(Json::Null, |x| number(*x as f64));
  }
  Json::Array(view.outer_iter().map(tensor_to_json).collect())
}
