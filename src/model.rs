// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model.rs - 推理引擎与模型资源
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
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use thiserror::Error;
use tracing::debug;

use crate::tensor::{InputTensor, RawOutputs, TensorShape};

/// 推理线程数上限
pub const THREAD_COUNT_LIMIT: usize = 10;

/// 将线程数截断到 `[1, THREAD_COUNT_LIMIT]`
pub fn clamp_thread_count(thread_count: usize) -> usize {
  thread_count.clamp(1, THREAD_COUNT_LIMIT)
}

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Malformed(String),
  #[error("模型输入形状不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    expected: TensorShape,
    actual: TensorShape,
  },
}

impl LoadError {
  pub fn malformed(msg: impl Into<String>) -> Self {
    LoadError::Malformed(msg.into())
  }
}

/// 引擎运行时错误，不影响会话后续使用
#[derive(Error, Debug)]
pub enum EngineError {
  #[error("张量内存分配失败: {0}")]
  Allocation(String),
  #[error("输入张量不匹配: {0}")]
  InputMismatch(String),
  #[error("引擎执行失败: {0}")]
  Invoke(String),
}

/// 已解析的模型资源
#[derive(Debug, Clone)]
pub struct ModelAsset {
  name: String,
  path: Option<PathBuf>,
  bytes: Arc<[u8]>,
}

impl ModelAsset {
  pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
    Self {
      name: name.into(),
      path: None,
      bytes: bytes.into(),
    }
  }

  pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, LoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => LoadError::NotFound(path.display().to_string()),
      _ => LoadError::Io(e),
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      bytes.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(Self {
      name: name.into(),
      path: Some(path.to_path_buf()),
      bytes: bytes.into(),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}

/// 模型资源加载器：把模型名称解析为可加载的资源
pub trait AssetLoader: Send + Sync {
  fn resolve(&self, name: &str) -> Result<ModelAsset, LoadError>;
}

const DEFAULT_MODEL_EXTENSION: &str = "onnx";

/// 从目录中按 `<root>/<name>.<ext>` 查找模型文件
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
  root: PathBuf,
  extension: String,
}

impl FsAssetLoader {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      extension: DEFAULT_MODEL_EXTENSION.to_string(),
    }
  }

  pub fn extension(mut self, extension: impl Into<String>) -> Self {
    self.extension = extension.into();
    self
  }

  fn path_for(&self, name: &str) -> PathBuf {
    // 名称自带扩展名时原样使用
    if Path::new(name).extension().is_some() {
      self.root.join(name)
    } else {
      self.root.join(format!("{}.{}", name, self.extension))
    }
  }
}

impl AssetLoader for FsAssetLoader {
  fn resolve(&self, name: &str) -> Result<ModelAsset, LoadError> {
    if name.is_empty() {
      return Err(LoadError::NotFound("<空模型名>".to_string()));
    }
    let path = self.path_for(name);
    debug!("解析模型 {} -> {}", name, path.display());
    ModelAsset::from_file(name, path)
  }
}

/// 内存中的模型资源表
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLoader {
  assets: HashMap<String, Arc<[u8]>>,
}

impl MemoryAssetLoader {
  pub fn with_asset(mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
    self.assets.insert(name.into(), bytes.into());
    self
  }
}

impl AssetLoader for MemoryAssetLoader {
  fn resolve(&self, name: &str) -> Result<ModelAsset, LoadError> {
    self
      .assets
      .get(name)
      .map(|bytes| ModelAsset::from_bytes(name, bytes.clone()))
      .ok_or_else(|| LoadError::NotFound(name.to_string()))
  }
}

/// 引擎创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
  pub thread_count: usize,
}

/// 推理引擎实例
///
/// 同一实例不支持并发调用，由会话负责串行化。
pub trait Engine: Send {
  fn input_shape(&self) -> TensorShape;
  fn invoke(&mut self, input: &InputTensor) -> Result<RawOutputs, EngineError>;
}

/// 从模型资源构建引擎实例
pub trait EngineFactory: Send + Sync {
  fn create(
    &self,
    asset: &ModelAsset,
    options: &EngineOptions,
  ) -> Result<Box<dyn Engine>, LoadError>;
}

impl<F> EngineFactory for F
where
  F: Fn(&ModelAsset, &EngineOptions) -> Result<Box<dyn Engine>, LoadError> + Send + Sync,
{
  fn create(
    &self,
    asset: &ModelAsset,
    options: &EngineOptions,
  ) -> Result<Box<dyn Engine>, LoadError> {
    self(asset, options)
  }
}

pub mod replay;
pub use self::replay::{ReplayEngine, ReplayFactory, ReplayModel};

#[cfg(feature = "model_onnx")]
pub mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxEngine, OnnxFactory};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn thread_count_is_clamped() {
    assert_eq!(clamp_thread_count(0), 1);
    assert_eq!(clamp_thread_count(4), 4);
    assert_eq!(clamp_thread_count(64), THREAD_COUNT_LIMIT);
  }

  #[test]
  fn fs_loader_appends_extension() {
    let loader = FsAssetLoader::new("/models");
    assert_eq!(
      loader.path_for("detect"),
      PathBuf::from("/models/detect.onnx")
    );
    assert_eq!(
      loader.path_for("detect.json"),
      PathBuf::from("/models/detect.json")
    );
  }

  #[test]
  fn fs_loader_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FsAssetLoader::new(dir.path());
    assert!(matches!(
      loader.resolve("missing"),
      Err(LoadError::NotFound(_))
    ));
  }

  #[test]
  fn fs_loader_reads_bytes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("detect.onnx"), b"model").unwrap();
    let asset = FsAssetLoader::new(dir.path()).resolve("detect").unwrap();
    assert_eq!(asset.name(), "detect");
    assert_eq!(asset.bytes(), b"model");
    assert!(asset.path().is_some());
  }

  #[test]
  fn memory_loader_lookup() {
    let loader = MemoryAssetLoader::default().with_asset("a", b"xyz".to_vec());
    assert_eq!(loader.resolve("a").unwrap().bytes(), b"xyz");
    assert!(matches!(loader.resolve("b"), Err(LoadError::NotFound(_))));
  }
}
