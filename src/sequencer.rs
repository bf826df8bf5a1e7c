// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sequencer.rs - 批量驱动数据集通过流水线
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

use ndarray::{Array1, Axis, stack};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  pipeline::Pipeline,
  processor::{Processor, ProcessorError},
  topics::Topics,
  value::{Kind, Value},
};

#[derive(Error, Debug)]
pub enum SequencerError {
  #[error("批大小必须大于 0")]
  InvalidBatchSize,
  #[error("批序号 {index} 超出范围, 共 {len} 批")]
  BatchOutOfRange { index: usize, len: usize },
  #[error("第 {index} 个样本处理失败: {source}")]
  Item {
    index: usize,
    #[source]
    source: ProcessorError,
  },
  #[error("第 {index} 批的样本全部处理失败")]
  EmptyBatch { index: usize },
  #[error("无法合并批次: {0}")]
  Collate(String),
  #[error("无法建立工作线程池: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 单个样本处理失败时的策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  /// 整批失败
  #[default]
  Abort,
  /// 记录警告并跳过该样本
  Skip,
}

/// 将数据集按批送入流水线
///
/// 同一批内的样本由多个工作线程并行处理，输出顺序与样本顺序一致。
/// 每个样本在处理前复制一份，数据集本身不会被修改。
pub struct Sequencer<'a, P: Processor + ?Sized = Pipeline> {
  pipeline: &'a P,
  items: &'a [Value],
  batch_size: usize,
  workers: usize,
  pool: Option<ThreadPool>,
  policy: FailurePolicy,
  steps: Option<usize>,
}

impl<'a, P: Processor + ?Sized> Sequencer<'a, P> {
  pub fn new(pipeline: &'a P, items: &'a [Value], batch_size: usize) -> Result<Self, SequencerError> {
    if batch_size == 0 {
      return Err(SequencerError::InvalidBatchSize);
    }
    Ok(Self {
      pipeline,
      items,
      batch_size,
      workers: 1,
      pool: None,
      policy: FailurePolicy::default(),
      steps: None,
    })
  }

  /// 设置工作线程数，大于 1 时为本序列建立独立的线程池
  pub fn with_workers(mut self, workers: usize) -> Result<Self, SequencerError> {
    self.workers = workers.max(1);
    self.pool = if self.workers > 1 {
      Some(ThreadPoolBuilder::new().num_threads(self.workers).build()?)
    } else {
      None
    };
    Ok(self)
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  /// 限制每轮最多产生的批数
  pub fn with_steps(mut self, steps: Option<usize>) -> Self {
    self.steps = steps;
    self
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub fn len(&self) -> usize {
    let full = self.items.len().div_ceil(self.batch_size);
    self.steps.map_or(full, |steps| steps.min(full))
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn batch(&self, index: usize) -> Result<Value, SequencerError> {
    let len = self.len();
    if index >= len {
      return Err(SequencerError::BatchOutOfRange { index, len });
    }
    let start = index * self.batch_size;
    let end = (start + self.batch_size).min(self.items.len());
    let chunk = &self.items[start..end];
    debug!("第 {} 批: 样本 {}..{}, {} 个工作线程", index, start, end, self.workers);

    let mut outputs = Vec::with_capacity(chunk.len());
    for (offset, result) in self.run(chunk).into_iter().enumerate() {
      match (result, self.policy) {
        (Ok(value), _) => outputs.push(value),
        (Err(source), FailurePolicy::Abort) => {
          return Err(SequencerError::Item {
            index: start + offset,
            source,
          });
        }
        (Err(source), FailurePolicy::Skip) => {
          warn!("跳过第 {} 个样本: {}", start + offset, source);
        }
      }
    }

    if outputs.is_empty() {
      return Err(SequencerError::EmptyBatch { index });
    }
    collate(outputs)
  }

  pub fn iter(&self) -> impl Iterator<Item = Result<Value, SequencerError>> + '_ {
    (0..self.len()).map(move |index| self.batch(index))
  }

  fn run(&self, chunk: &[Value]) -> Vec<Result<Value, ProcessorError>> {
    let pipeline = self.pipeline;
    match &self.pool {
      Some(pool) => pool.install(|| {
        chunk
          .par_iter()
          .map(|item| pipeline.process(item.clone()))
          .collect()
      }),
      None => chunk
        .iter()
        .map(|item| pipeline.process(item.clone()))
        .collect(),
    }
  }
}

/// 将一批样本的输出合并为一个值
///
/// 张量在新的第 0 轴上堆叠，标量合并为一维张量，
/// 文本与列表合并为列表，主题映射按主题逐一合并。
pub fn collate(values: Vec<Value>) -> Result<Value, SequencerError> {
  let Some(kind) = values.first().map(Value::kind) else {
    return Err(SequencerError::Collate("空批次".to_string()));
  };
  if let Some(other) = values.iter().find(|value| value.kind() != kind) {
    return Err(SequencerError::Collate(format!(
      "种类不一致: {} 与 {}",
      kind,
      other.kind()
    )));
  }

  match kind {
    Kind::Tensor => {
      let views: Vec<_> = values
        .iter()
        .filter_map(Value::as_tensor)
        .map(|tensor| tensor.view())
        .collect();
      stack(Axis(0), &views)
        .map(Value::Tensor)
        .map_err(|e| SequencerError::Collate(format!("张量形状不一致: {}", e)))
    }
    Kind::Scalar => {
      let data: Array1<f32> = values
        .iter()
        .filter_map(|value| match value {
          Value::Scalar(x) => Some(*x as f32),
          _ => None,
        })
        .collect();
      Ok(Value::from(data))
    }
    Kind::Topics => collate_topics(values),
    _ => Ok(Value::List(values)),
  }
}

fn collate_topics(values: Vec<Value>) -> Result<Value, SequencerError> {
  let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
  let mut expected: Option<Vec<String>> = None;
  for value in values {
    let Value::Topics(topics) = value else {
      continue;
    };
    let keys: Vec<String> = topics.keys().map(str::to_string).collect();
    match &expected {
      Some(expected) if *expected != keys => {
        return Err(SequencerError::Collate(format!(
          "主题不一致: {:?} 与 {:?}",
          expected, keys
        )));
      }
      Some(_) => {}
      None => expected = Some(keys),
    }
    for (topic, value) in topics {
      columns.entry(topic).or_default().push(value);
    }
  }

  let topics = columns
    .into_iter()
    .map(|(topic, values)| Ok::<_, SequencerError>((topic, collate(values)?)))
    .collect::<Result<Topics, _>>()?;
  Ok(Value::Topics(topics))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::processor::{ExpandDims, OnTopic, Squeeze};
  use ndarray::array;

  fn items(n: usize) -> Vec<Value> {
    (0..n)
      .map(|i| {
        Value::Topics(
          Topics::new()
            .with("image", array![i as f32, 1.0, 2.0])
            .with("id", i as f64),
        )
      })
      .collect()
  }

  #[test]
  fn zero_batch_size_is_rejected() {
    let pipeline = Pipeline::new();
    let data = items(2);
    assert!(matches!(
      Sequencer::new(&pipeline, &data, 0),
      Err(SequencerError::InvalidBatchSize)
    ));
  }

  #[test]
  fn len_rounds_up_and_respects_steps() {
    let pipeline = Pipeline::new();
    let data = items(10);
    let sequencer = Sequencer::new(&pipeline, &data, 4).unwrap();
    assert_eq!(sequencer.len(), 3);
    assert_eq!(sequencer.with_steps(Some(2)).len(), 2);
  }

  #[test]
  fn batches_are_stacked_in_item_order() {
    let pipeline = Pipeline::new().add(OnTopic::new("image", ExpandDims::new(0)));
    let data = items(5);
    let sequencer = Sequencer::new(&pipeline, &data, 4)
      .unwrap()
      .with_workers(3)
      .unwrap();

    let batch = sequencer.batch(0).unwrap();
    let topics = batch.as_topics().unwrap();
    let image = topics.get("image").and_then(Value::as_tensor).unwrap();
    assert_eq!(image.shape(), &[4, 1, 3]);
    let ids = topics.get("id").and_then(Value::as_tensor).unwrap();
    assert_eq!(ids.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0]);

    let last = sequencer.batch(1).unwrap();
    let image = last.as_topics().unwrap().get("image").unwrap();
    assert_eq!(image.as_tensor().unwrap().shape(), &[1, 1, 3]);

    assert!(matches!(
      sequencer.batch(2),
      Err(SequencerError::BatchOutOfRange { index: 2, len: 2 })
    ));
  }

  #[test]
  fn parallel_and_serial_batches_agree() {
    let pipeline = Pipeline::new().add(OnTopic::new("image", ExpandDims::new(-1)));
    let data = items(7);
    let serial = Sequencer::new(&pipeline, &data, 7).unwrap();
    let parallel = Sequencer::new(&pipeline, &data, 7)
      .unwrap()
      .with_workers(4)
      .unwrap();
    assert_eq!(serial.batch(0).unwrap(), parallel.batch(0).unwrap());
  }

  struct PoolWidth {
    widest: std::sync::atomic::AtomicUsize,
  }

  impl Processor for PoolWidth {
    fn process(&self, value: Value) -> Result<Value, ProcessorError> {
      self
        .widest
        .fetch_max(rayon::current_num_threads(), std::sync::atomic::Ordering::SeqCst);
      Ok(value)
    }
  }

  #[test]
  fn workers_bound_the_thread_pool() {
    let width = PoolWidth {
      widest: std::sync::atomic::AtomicUsize::new(0),
    };
    let data = items(16);
    let sequencer = Sequencer::new(&width, &data, 16)
      .unwrap()
      .with_workers(3)
      .unwrap();
    let batch = sequencer.batch(0).unwrap();
    let ids = batch.as_topics().unwrap().get("id").unwrap();
    assert_eq!(ids.as_tensor().unwrap().len(), 16);
    assert_eq!(width.widest.load(std::sync::atomic::Ordering::SeqCst), 3);
  }

  #[test]
  fn abort_policy_reports_failed_item() {
    let pipeline = Pipeline::new().add(Squeeze::new(0, "image"));
    let data = items(3);
    let sequencer = Sequencer::new(&pipeline, &data, 2).unwrap();
    assert!(matches!(
      sequencer.batch(1),
      Err(SequencerError::Item { index: 2, .. })
    ));
  }

  #[test]
  fn skip_policy_drops_failed_items() {
    let pipeline = Pipeline::new().add(Squeeze::new(0, "image"));
    let mut data = items(2);
    data.push(Value::Topics(
      Topics::new().with("image", array![[1.0f32, 2.0, 3.0]]).with("id", 2.0),
    ));
    let sequencer = Sequencer::new(&pipeline, &data, 3)
      .unwrap()
      .with_policy(FailurePolicy::Skip);
    let batch = sequencer.batch(0).unwrap();
    let ids = batch.as_topics().unwrap().get("id").unwrap();
    assert_eq!(ids, &Value::from(array![2.0f32]));

    let data = items(2);
    let sequencer = Sequencer::new(&pipeline, &data, 2)
      .unwrap()
      .with_policy(FailurePolicy::Skip);
    assert!(matches!(
      sequencer.batch(0),
      Err(SequencerError::EmptyBatch { index: 0 })
    ));
  }

  #[test]
  fn collate_rejects_mismatched_shapes() {
    let values = vec![Value::from(array![1.0f32]), Value::from(array![1.0f32, 2.0])];
    assert!(matches!(collate(values), Err(SequencerError::Collate(_))));
  }

  #[test]
  fn collate_keeps_texts_as_list() {
    let values = vec![Value::from("cat"), Value::from("dog")];
    assert_eq!(
      collate(values).unwrap(),
      Value::List(vec![Value::from("cat"), Value::from("dog")])
    );
  }

  #[test]
  fn iter_yields_every_batch() {
    let pipeline = Pipeline::new();
    let data = items(5);
    let sequencer = Sequencer::new(&pipeline, &data, 2).unwrap();
    let batches: Vec<_> = sequencer.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 3);
  }
}
