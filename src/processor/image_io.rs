// 该文件是 Shanan （山南西风） 项目的一部分。
// src/processor/image_io.rs - 图像读取与缩放处理器
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

use image::{ImageReader, RgbImage, imageops::FilterType};
use ndarray::{Array3, ArrayD};
use tracing::debug;

use crate::{
  processor::{Contract, Processor, ProcessorError},
  value::{Kind, Value},
};

const RGB_CHANNELS: usize = 3;

/// 从路径读取 RGB 图像，输出 HWC 排列的张量，取值 0-255
#[derive(Debug, Clone, Default)]
pub struct LoadImage;

impl LoadImage {
  pub fn new() -> Self {
    Self
  }
}

impl Processor for LoadImage {
  fn contract(&self) -> Contract {
    Contract::value(Kind::Text, Kind::Tensor)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    let path = value.into_text(self.name())?;
    debug!("读取图像文件: {}", path);
    let frame = ImageReader::open(&path)
      .map_err(|e| self.image_error(e.into()))?
      .decode()
      .map_err(|e| self.image_error(e))?;
    image_to_tensor(self.name(), frame.into()).map(Value::Tensor)
  }
}

impl LoadImage {
  fn image_error(&self, source: image::ImageError) -> ProcessorError {
    ProcessorError::Image {
      processor: self.name().to_string(),
      source,
    }
  }
}

/// 将 HWC 排列的 RGB 张量缩放到固定尺寸
#[derive(Debug, Clone)]
pub struct ResizeImage {
  width: u32,
  height: u32,
  filter: FilterType,
}

impl ResizeImage {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      filter: FilterType::Triangle,
    }
  }

  pub fn filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }
}

impl Processor for ResizeImage {
  fn contract(&self) -> Contract {
    Contract::value(Kind::Tensor, Kind::Tensor)
  }

  fn process(&self, value: Value) -> Result<Value, ProcessorError> {
    if self.width == 0 || self.height == 0 {
      return Err(ProcessorError::invalid_parameter(
        self.name(),
        format!("目标尺寸 {}x{} 无效", self.width, self.height),
      ));
    }
    let tensor = value.into_tensor(self.name())?;
    let frame = tensor_to_image(self.name(), &tensor)?;
    let resized = image::imageops::resize(&frame, self.width, self.height, self.filter);
    image_to_tensor(self.name(), resized).map(Value::Tensor)
  }
}

fn image_to_tensor(name: &str, image: RgbImage) -> Result<ArrayD<f32>, ProcessorError> {
  let (width, height) = image.dimensions();
  let data: Vec<f32> = image.into_raw().into_iter().map(f32::from).collect();
  Array3::from_shape_vec((height as usize, width as usize, RGB_CHANNELS), data)
    .map(|tensor| tensor.into_dyn())
    .map_err(|e| ProcessorError::shape(name, "HWC 图像", e))
}

fn tensor_to_image(name: &str, tensor: &ArrayD<f32>) -> Result<RgbImage, ProcessorError> {
  let shape = tensor.shape();
  if shape.len() != 3 || shape[2] != RGB_CHANNELS {
    return Err(ProcessorError::shape(
      name,
      "[高, 宽, 3] 的 RGB 张量",
      format!("{:?}", shape),
    ));
  }
  let (height, width) = (shape[0] as u32, shape[1] as u32);
  // 按逻辑顺序遍历，与内存布局无关
  let data: Vec<u8> = tensor
    .iter()
    .map(|&x| x.round().clamp(0.0, 255.0) as u8)
    .collect();
  RgbImage::from_raw(width, height, data)
    .ok_or_else(|| ProcessorError::shape(name, "像素数量与尺寸一致", format!("{:?}", shape)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn checkerboard() -> RgbImage {
    RgbImage::from_fn(4, 2, |x, y| {
      if (x + y) % 2 == 0 {
        Rgb([255, 0, 0])
      } else {
        Rgb([0, 0, 255])
      }
    })
  }

  #[test]
  fn load_image_reads_hwc_tensor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkerboard.png");
    checkerboard().save(&path).unwrap();

    let out = LoadImage::new()
      .process(Value::from(path.to_string_lossy().as_ref()))
      .unwrap();

    let tensor = out.as_tensor().unwrap();
    assert_eq!(tensor.shape(), &[2, 4, 3]);
    assert_eq!(tensor[[0, 0, 0]], 255.0);
    assert_eq!(tensor[[0, 1, 2]], 255.0);
  }

  #[test]
  fn load_image_reports_missing_file() {
    let err = LoadImage::new()
      .process(Value::from("/nonexistent/shanan-pipe.png"))
      .unwrap_err();
    assert!(matches!(err, ProcessorError::Image { .. }));
  }

  #[test]
  fn resize_image_changes_spatial_shape() {
    let tensor = image_to_tensor("test", checkerboard()).unwrap();
    let out = ResizeImage::new(8, 6).process(Value::Tensor(tensor)).unwrap();
    assert_eq!(out.as_tensor().unwrap().shape(), &[6, 8, 3]);
  }

  #[test]
  fn resize_image_rejects_non_rgb() {
    let tensor = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 2]));
    let err = ResizeImage::new(4, 4)
      .process(Value::Tensor(tensor))
      .unwrap_err();
    assert!(matches!(err, ProcessorError::ShapeMismatch { .. }));
  }
}
