// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 流水线任务
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  processor::Processor,
  sequencer::{FailurePolicy, Sequencer, SequencerError},
  value::Value,
};

pub trait Task<I, P: ?Sized>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &P) -> Result<(), Self::Error>;
}

/// 只处理第一个样本，用于预览流水线输出
pub struct OneShotTask;

impl OneShotTask {
  /// 处理第一个样本并返回输出
  pub fn preview<P: Processor + ?Sized>(
    &self,
    input: &[Value],
    pipeline: &P,
  ) -> Result<Value, anyhow::Error> {
    info!("开始任务...");
    let item = input
      .first()
      .cloned()
      .ok_or_else(|| anyhow::anyhow!("没有输入样本"))?;
    info!("输入样本: {}", item.describe());
    let now = Instant::now();
    let output = pipeline.process(item)?;
    info!("处理完成，耗时: {:.2?}", now.elapsed());
    info!("输出: {}", output.describe());
    Ok(output)
  }
}

impl<P: Processor + ?Sized> Task<&[Value], P> for OneShotTask {
  type Error = anyhow::Error;

  fn run_task(self, input: &[Value], pipeline: &P) -> Result<(), Self::Error> {
    self.preview(input, pipeline).map(|_| ())
  }
}

/// 按轮次遍历数据集的全部批次
#[derive(Debug)]
pub struct EpochTask {
  batch_size: usize,
  workers: usize,
  policy: FailurePolicy,
  steps: Option<usize>,
  epochs: usize,
  validation: Option<Vec<Value>>,
  eval_every: usize,
  stop: Option<Arc<AtomicBool>>,
}

impl Default for EpochTask {
  fn default() -> Self {
    Self {
      batch_size: 1,
      workers: 1,
      policy: FailurePolicy::default(),
      steps: None,
      epochs: 1,
      validation: None,
      eval_every: 1,
      stop: None,
    }
  }
}

impl EpochTask {
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size;
    self
  }

  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_steps(mut self, steps: Option<usize>) -> Self {
    self.steps = steps;
    self
  }

  pub fn with_epochs(mut self, epochs: usize) -> Self {
    self.epochs = epochs;
    self
  }

  /// 验证集与训练集共用流水线，每 `eval_every` 轮结束后完整遍历一次
  pub fn with_validation(mut self, items: Vec<Value>, eval_every: usize) -> Self {
    self.validation = Some(items);
    self.eval_every = eval_every.max(1);
    self
  }

  /// 每批结束后检查该标志，置位时提前退出
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stopped(&self) -> bool {
    self
      .stop
      .as_ref()
      .map(|stop| stop.load(Ordering::SeqCst))
      .unwrap_or(false)
  }
}

impl<P: Processor + ?Sized> Task<&[Value], P> for EpochTask {
  type Error = anyhow::Error;

  fn run_task(self, input: &[Value], pipeline: &P) -> Result<(), Self::Error> {
    let sequencer = Sequencer::new(pipeline, input, self.batch_size)?
      .with_workers(self.workers)?
      .with_policy(self.policy)
      .with_steps(self.steps);
    let validation = match &self.validation {
      Some(items) => Some(
        Sequencer::new(pipeline, items, self.batch_size)?
          .with_workers(self.workers)?
          .with_policy(self.policy),
      ),
      None => None,
    };
    info!(
      "开始任务: {} 个样本, 每轮 {} 批, 共 {} 轮",
      input.len(),
      sequencer.len(),
      self.epochs
    );

    let mut times = Vec::new();
    'epochs: for epoch in 0..self.epochs {
      for index in 0..sequencer.len() {
        let now = Instant::now();
        let batch = sequencer.batch(index)?;
        let elapsed = now.elapsed();
        info!(
          "第 {} 轮 第 {} 批完成，耗时: {:.2?}, 输出: {}",
          epoch,
          index,
          elapsed,
          batch.describe()
        );
        times.push(elapsed);
        if self.stopped() {
          warn!("中断信号接收，退出任务循环");
          break 'epochs;
        }
      }

      if let Some(validation) = &validation {
        if (epoch + 1) % self.eval_every == 0 {
          validate_epoch(epoch, validation)?;
        }
      }
    }

    if !times.is_empty() {
      info!(
        "平均每批耗时: {:.2?}",
        times.iter().sum::<Duration>() / times.len() as u32
      );
    }
    info!("任务完成，退出");
    Ok(())
  }
}

fn validate_epoch<P: Processor + ?Sized>(
  epoch: usize,
  sequencer: &Sequencer<'_, P>,
) -> Result<(), SequencerError> {
  let now = Instant::now();
  for batch in sequencer.iter() {
    batch?;
  }
  info!(
    "第 {} 轮验证完成: {} 批，耗时: {:.2?}",
    epoch,
    sequencer.len(),
    now.elapsed()
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{pipeline::Pipeline, processor::Squeeze, topics::Topics};
  use ndarray::array;
  use std::sync::atomic::AtomicUsize;

  struct Counter {
    calls: AtomicUsize,
  }

  impl Processor for Counter {
    fn process(&self, value: Value) -> Result<Value, crate::processor::ProcessorError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(value)
    }
  }

  fn counter() -> Counter {
    Counter {
      calls: AtomicUsize::new(0),
    }
  }

  fn items() -> Vec<Value> {
    (0..4)
      .map(|i| Value::Topics(Topics::new().with("x", array![[i as f32]])))
      .collect()
  }

  #[test]
  fn one_shot_requires_an_item() {
    let pipeline = Pipeline::new();
    let empty: &[Value] = &[];
    assert!(OneShotTask.run_task(empty, &pipeline).is_err());
    assert!(OneShotTask.run_task(items().as_slice(), &pipeline).is_ok());
  }

  #[test]
  fn preview_processes_first_item_once() {
    let pipeline = counter();
    let data = items();
    let output = OneShotTask.preview(&data, &pipeline).unwrap();
    assert_eq!(output, data[0]);
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn epoch_task_runs_all_batches() {
    let pipeline = Pipeline::new().add(Squeeze::new(0, "x"));
    let task = EpochTask::default()
      .with_batch_size(3)
      .with_workers(2)
      .with_epochs(2);
    assert!(task.run_task(items().as_slice(), &pipeline).is_ok());
  }

  #[test]
  fn epoch_task_surfaces_item_errors() {
    let pipeline = Pipeline::new().add(Squeeze::new(0, "missing"));
    assert!(EpochTask::default().run_task(items().as_slice(), &pipeline).is_err());
  }

  #[test]
  fn epoch_task_rejects_zero_batch_size() {
    let pipeline = Pipeline::new();
    let task = EpochTask::default().with_batch_size(0);
    assert!(task.run_task(items().as_slice(), &pipeline).is_err());
  }

  #[test]
  fn stop_flag_ends_early() {
    let stop = Arc::new(AtomicBool::new(true));
    let pipeline = Pipeline::new();
    let task = EpochTask::default()
      .with_epochs(1000)
      .with_stop_flag(stop.clone());
    assert!(task.run_task(items().as_slice(), &pipeline).is_ok());
    assert!(stop.load(Ordering::SeqCst));
  }

  #[test]
  fn validation_runs_after_each_epoch() {
    let pipeline = counter();
    let task = EpochTask::default()
      .with_batch_size(2)
      .with_epochs(2)
      .with_validation(items()[..3].to_vec(), 1);
    task.run_task(items().as_slice(), &pipeline).unwrap();
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2 * 4 + 2 * 3);
  }

  #[test]
  fn validation_respects_eval_frequency() {
    let pipeline = counter();
    let task = EpochTask::default()
      .with_batch_size(2)
      .with_epochs(3)
      .with_validation(items()[..3].to_vec(), 2);
    task.run_task(items().as_slice(), &pipeline).unwrap();
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 3 * 4 + 3);
  }

  #[test]
  fn validation_errors_stop_the_task() {
    let pipeline = Pipeline::new().add(Squeeze::new(0, "x"));
    let broken = vec![Value::Topics(Topics::new().with("y", 1.0))];
    let task = EpochTask::default().with_validation(broken, 1);
    assert!(task.run_task(items().as_slice(), &pipeline).is_err());
  }
}
