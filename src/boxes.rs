// 该文件是 Shanan （山南西风） 项目的一部分。
// src/boxes.rs - 边界框辅助函数
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

use ndarray::Array2;
use thiserror::Error;

/// 边界框数组中类别所在的列，之前四列为 [x_min, y_min, x_max, y_max]
pub const CLASS_COLUMN: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("类别索引 {index} 超出范围 [0, {num_classes})")]
pub struct OneHotError {
  pub index: i64,
  pub num_classes: usize,
}

/// 将类别索引编码为独热向量，每个索引一行
pub fn to_one_hot(indices: &[i64], num_classes: usize) -> Result<Array2<f32>, OneHotError> {
  let mut one_hot = Array2::zeros((indices.len(), num_classes));
  for (row, &index) in indices.iter().enumerate() {
    if index < 0 || index as u64 >= num_classes as u64 {
      return Err(OneHotError { index, num_classes });
    }
    one_hot[[row, index as usize]] = 1.0;
  }
  Ok(one_hot)
}
