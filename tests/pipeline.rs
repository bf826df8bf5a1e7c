// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use ndarray::{Array2, Axis, s};
use proptest::prelude::*;

use shanan_pipe::{
  FailurePolicy, Pipeline, Processor, ProcessorError, Schema, Sequencer, Topics, Value,
  config::PipelineConfig,
  dataset::JsonDataset,
  processor::{
    BoxClassToOneHotVector, ExpandDims, INPUTS_TOPIC, LABELS_TOPIC, Lambda, OnTopic,
    OutputSelector,
  },
};

fn boxes(classes: &[usize]) -> Array2<f32> {
  let mut boxes = Array2::<f32>::zeros((classes.len(), 5));
  for (row, &class) in classes.iter().enumerate() {
    boxes[[row, 0]] = row as f32;
    boxes[[row, 2]] = row as f32 + 1.0;
    boxes[[row, 4]] = class as f32;
  }
  boxes
}

fn detection() -> Pipeline {
  PipelineConfig::detection(4, vec!["image".into()], vec!["boxes".into()])
    .build()
    .unwrap()
}

proptest! {
  #[test]
  fn one_hot_rows_keep_coordinates_and_sum_to_one(
    classes in prop::collection::vec(0usize..4, 1..16)
  ) {
    let input = boxes(&classes);
    let out = BoxClassToOneHotVector::new(4)
      .process(Value::from(input.clone()))
      .unwrap();
    let out = out.as_tensor().unwrap().clone().into_dimensionality::<ndarray::Ix2>().unwrap();

    prop_assert_eq!(out.shape(), &[classes.len(), 8]);
    prop_assert_eq!(out.slice(s![.., ..4]), input.slice(s![.., ..4]));
    for (row, &class) in out.axis_iter(Axis(0)).zip(&classes) {
      prop_assert_eq!(row.slice(s![4..]).sum(), 1.0);
      prop_assert_eq!(row[4 + class], 1.0);
    }
  }

  #[test]
  fn one_hot_rejects_classes_outside_range(class in 4usize..64) {
    let err = BoxClassToOneHotVector::new(4)
      .process(Value::from(boxes(&[0, class])))
      .unwrap_err();
    let is_out_of_range = matches!(err, ProcessorError::IndexOutOfRange { .. });
    prop_assert!(is_out_of_range);
  }

  #[test]
  fn pipeline_is_deterministic(
    classes in prop::collection::vec(0usize..4, 1..8),
    pixel in 0.0f32..255.0
  ) {
    let item = Value::Topics(
      Topics::new()
        .with("image", Array2::<f32>::from_elem((2, 2), pixel))
        .with("boxes", boxes(&classes)),
    );
    let pipeline = detection();
    prop_assert_eq!(
      pipeline.process(item.clone()).unwrap(),
      pipeline.process(item).unwrap()
    );
  }

  #[test]
  fn sequencer_yields_ceil_batches(len in 1usize..40, batch_size in 1usize..9) {
    let items: Vec<Value> = (0..len)
      .map(|i| Value::Topics(
        Topics::new()
          .with("image", Array2::<f32>::from_elem((2, 2), i as f32))
          .with("boxes", boxes(&[i % 4])),
      ))
      .collect();
    let pipeline = detection();
    let sequencer = Sequencer::new(&pipeline, &items, batch_size)
      .unwrap()
      .with_workers(3)
      .unwrap();
    prop_assert_eq!(sequencer.len(), len.div_ceil(batch_size));

    let mut seen = 0;
    for batch in sequencer.iter() {
      let batch = batch.unwrap();
      let inputs = batch.as_topics().unwrap().get(INPUTS_TOPIC).unwrap();
      let image = inputs.as_topics().unwrap().get("image").unwrap();
      let image = image.as_tensor().unwrap();
      prop_assert_eq!(&image.shape()[1..], &[2, 2]);
      for (offset, plane) in image.axis_iter(Axis(0)).enumerate() {
        prop_assert_eq!(plane[[0, 0]], (seen + offset) as f32);
      }
      seen += image.shape()[0];
    }
    prop_assert_eq!(seen, len);
  }
}

#[test]
fn dataset_to_batches() {
  let items = JsonDataset::parse(
    r#"[
      {"image": [[0, 1], [2, 3]], "boxes": [[0, 0, 1, 1, 3]], "path": "a.png"},
      {"image": [[4, 5], [6, 7]], "boxes": [[0, 0, 1, 1, 1]], "path": "b.png"},
      {"image": [[8, 9], [10, 11]], "boxes": [[0, 0, 1, 1, 9]], "path": "c.png"}
    ]"#,
  )
  .unwrap();
  let pipeline = detection();
  pipeline.validate(&Schema::of(&items[0])).unwrap();

  let abort = Sequencer::new(&pipeline, &items, 3).unwrap();
  assert!(abort.batch(0).is_err());

  let skip = Sequencer::new(&pipeline, &items, 3)
    .unwrap()
    .with_policy(FailurePolicy::Skip);
  let batch = skip.batch(0).unwrap();
  let labels = batch.as_topics().unwrap().get(LABELS_TOPIC).unwrap();
  let boxes = labels.as_topics().unwrap().get("boxes").unwrap();
  assert_eq!(boxes.as_tensor().unwrap().shape(), &[2, 1, 8]);
}

#[test]
fn lambda_and_positional_processors_compose() {
  let pipeline = Pipeline::new()
    .add(Lambda::new(
      |value: Value, scale: &f32| {
        let image = value.into_tensor("normalize")?;
        Ok(Value::Tensor(image.mapv(|x| x / scale)))
      },
      255.0f32,
      "image",
    ))
    .add(OnTopic::new("image", ExpandDims::new(0)))
    .add(OutputSelector::new(["image"], ["boxes"]).unwrap());

  let item = Value::Topics(
    Topics::new()
      .with("image", Array2::<f32>::from_elem((2, 2), 255.0))
      .with("boxes", boxes(&[1])),
  );
  let out = pipeline.process(item).unwrap();
  let inputs = out.as_topics().unwrap().get(INPUTS_TOPIC).unwrap();
  let image = inputs.as_topics().unwrap().get("image").unwrap();
  assert_eq!(
    image,
    &Value::from(ndarray::Array3::<f32>::ones((1, 2, 2)))
  );
}
