// 该文件是 Shanan （山南西风） 项目的一部分。
// src/dataset.rs - 数据集读取
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  value::{Value, ValueError},
};

pub trait Dataset {
  type Error;
  fn load_data(&self) -> Result<Vec<Value>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("数据集顶层必须是 JSON 数组")]
  NotAnArray,
  #[error("第 {index} 个样本无法转换: {source}")]
  Item {
    index: usize,
    #[source]
    source: ValueError,
  },
}

/// JSON 数组形式的数据集，每个元素是一个样本
#[derive(Debug, Clone)]
pub struct JsonDataset {
  path: PathBuf,
}

impl JsonDataset {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 直接从 JSON 文本解析样本
  pub fn parse(text: &str) -> Result<Vec<Value>, DatasetError> {
    let serde_json::Value::Array(items) = serde_json::from_str(text)? else {
      return Err(DatasetError::NotAnArray);
    };
    items
      .into_iter()
      .enumerate()
      .map(|(index, item)| Value::try_from(item).map_err(|source| DatasetError::Item { index, source }))
      .collect()
  }
}

impl FromUrlWithScheme for JsonDataset {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonDataset {
  type Error = DatasetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DatasetError::SchemeMismatch);
    }
    Ok(Self::new(url.path()))
  }
}

impl Dataset for JsonDataset {
  type Error = DatasetError;

  fn load_data(&self) -> Result<Vec<Value>, Self::Error> {
    info!("读取数据集: {}", self.path.display());
    let text = std::fs::read_to_string(&self.path)?;
    let items = Self::parse(&text)?;
    info!("数据集共 {} 个样本", items.len());
    Ok(items)
  }
}
