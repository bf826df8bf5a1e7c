// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use std::marker::PhantomData;

use crate::value::Value;

/// 预测模型
///
/// 模型本身不在本库中实现，`Predict` 处理器只通过此接口调用模型。
/// 多个工作线程会同时调用 `predict`，实现需要支持并发只读访问。
pub trait Model: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn predict(&self, input: &Value) -> Result<Value, Self::Error>;
}

impl<M: Model + ?Sized> Model for std::sync::Arc<M> {
  type Error = M::Error;

  fn predict(&self, input: &Value) -> Result<Value, Self::Error> {
    (**self).predict(input)
  }
}

/// 由闭包构成的模型
pub struct FnModel<F, E> {
  function: F,
  _phantom: PhantomData<fn() -> E>,
}

impl<F, E> FnModel<F, E>
where
  F: Fn(&Value) -> Result<Value, E> + Send + Sync,
  E: std::error::Error + Send + Sync + 'static,
{
  pub fn new(function: F) -> Self {
    Self {
      function,
      _phantom: PhantomData,
    }
  }
}

impl<F, E> Model for FnModel<F, E>
where
  F: Fn(&Value) -> Result<Value, E> + Send + Sync,
  E: std::error::Error + Send + Sync + 'static,
{
  type Error = E;

  fn predict(&self, input: &Value) -> Result<Value, Self::Error> {
    (self.function)(input)
  }
}
