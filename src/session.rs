// 该文件是 Qianli （千里眼） 项目的一部分。
// src/session.rs - 推理会话
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
  fmt,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Instant,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  model::{Engine, EngineError, EngineFactory, EngineOptions, LoadError, ModelAsset, clamp_thread_count},
  tensor::{InputTensor, RawOutputs, TensorShape},
};

#[derive(Error, Debug)]
pub enum InferError {
  #[error("尚未加载任何模型")]
  NoModelLoaded,
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
  #[error("输出张量无效: {0}")]
  MalformedOutput(String),
}

/// 已加载的模型句柄
pub struct LoadedModel {
  name: String,
  version: u64,
  thread_count: usize,
  input_shape: TensorShape,
  engine: Mutex<Box<dyn Engine>>,
}

impl LoadedModel {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// 每次成功加载递增，从 1 开始
  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn thread_count(&self) -> usize {
    self.thread_count
  }

  pub fn input_shape(&self) -> TensorShape {
    self.input_shape
  }
}

impl fmt::Debug for LoadedModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadedModel")
      .field("name", &self.name)
      .field("version", &self.version)
      .field("thread_count", &self.thread_count)
      .field("input_shape", &self.input_shape)
      .finish_non_exhaustive()
  }
}

enum SessionState {
  Unloaded,
  Loaded(Arc<LoadedModel>),
}

/// 推理会话
///
/// 持有当前模型并串行化对引擎的访问：`infer` 与 `load` 共用同一把执行锁，
/// 加载新模型时会等待正在进行的推理结束。推理使用调用方传入的模型快照，
/// 所以替换模型不会影响已经接纳的帧。
pub struct InterpreterSession {
  factory: Arc<dyn EngineFactory>,
  expected_shape: TensorShape,
  state: RwLock<SessionState>,
  exec: Mutex<()>,
  versions: AtomicU64,
}

impl InterpreterSession {
  pub fn new(factory: Arc<dyn EngineFactory>, expected_shape: TensorShape) -> Self {
    Self {
      factory,
      expected_shape,
      state: RwLock::new(SessionState::Unloaded),
      exec: Mutex::new(()),
      versions: AtomicU64::new(0),
    }
  }

  pub fn expected_shape(&self) -> TensorShape {
    self.expected_shape
  }

  pub fn is_loaded(&self) -> bool {
    matches!(*self.state.read(), SessionState::Loaded(_))
  }

  /// 当前模型的快照
  pub fn current(&self) -> Result<Arc<LoadedModel>, InferError> {
    match &*self.state.read() {
      SessionState::Loaded(model) => Ok(model.clone()),
      SessionState::Unloaded => Err(InferError::NoModelLoaded),
    }
  }

  /// 加载模型并替换当前句柄；失败时保留原有模型
  pub fn load(&self, asset: &ModelAsset, thread_count: usize) -> Result<Arc<LoadedModel>, LoadError> {
    let thread_count = clamp_thread_count(thread_count);
    let _exec = self.exec.lock();

    info!("创建推理引擎: {} (线程数 {})", asset.name(), thread_count);
    let engine = self
      .factory
      .create(asset, &EngineOptions { thread_count })
      .inspect_err(|e| error!("创建推理引擎失败: {}", e))?;

    let input_shape = engine.input_shape();
    if input_shape != self.expected_shape {
      error!(
        "模型输入形状不匹配: 期望 {}, 实际 {}",
        self.expected_shape, input_shape
      );
      return Err(LoadError::ShapeMismatch {
        expected: self.expected_shape,
        actual: input_shape,
      });
    }

    let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
    let model = Arc::new(LoadedModel {
      name: asset.name().to_string(),
      version,
      thread_count,
      input_shape,
      engine: Mutex::new(engine),
    });
    *self.state.write() = SessionState::Loaded(model.clone());
    info!("模型加载完成: {} (版本 {})", asset.name(), version);

    Ok(model)
  }

  /// 单次阻塞推理，返回输出与纯推理耗时（毫秒）
  pub fn infer(
    &self,
    model: &LoadedModel,
    input: &InputTensor,
  ) -> Result<(RawOutputs, f64), InferError> {
    let _exec = self.exec.lock();
    let mut engine = model.engine.lock();

    let start = Instant::now();
    let outputs = engine.invoke(input);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let outputs = outputs?;
    outputs.check_layout().map_err(InferError::MalformedOutput)?;
    debug!(
      "模型 {} (版本 {}) 推理完成，耗时 {:.2} ms",
      model.name, model.version, elapsed_ms
    );
    Ok((outputs, elapsed_ms))
  }

  /// 使用当前模型推理
  pub fn infer_current(&self, input: &InputTensor) -> Result<(RawOutputs, f64), InferError> {
    let model = self.current()?;
    self.infer(&model, input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{ReplayFactory, ReplayModel},
    tensor::{SSD_INPUT_SHAPE, TensorType},
  };

  fn replay_asset(name: &str, shape: TensorShape, count: f32) -> ModelAsset {
    let model = ReplayModel {
      input_shape: shape,
      input_type: TensorType::UInt8,
      latency_ms: 0,
      outputs: vec![RawOutputs {
        boxes: vec![0.0, 0.0, 1.0, 1.0],
        classes: vec![0.0],
        scores: vec![0.9],
        count,
      }],
    };
    ModelAsset::from_bytes(name, model.to_json())
  }

  fn session() -> InterpreterSession {
    InterpreterSession::new(Arc::new(ReplayFactory), SSD_INPUT_SHAPE)
  }

  #[test]
  fn infer_without_model_is_rejected() {
    let session = session();
    let input = InputTensor::zeroed(SSD_INPUT_SHAPE, TensorType::UInt8);
    assert!(!session.is_loaded());
    assert!(matches!(
      session.infer_current(&input),
      Err(InferError::NoModelLoaded)
    ));
  }

  #[test]
  fn load_clamps_thread_count_and_bumps_version() {
    let session = session();
    let first = session
      .load(&replay_asset("a", SSD_INPUT_SHAPE, 1.0), 0)
      .unwrap();
    assert_eq!(first.thread_count(), 1);
    assert_eq!(first.version(), 1);
    let second = session
      .load(&replay_asset("b", SSD_INPUT_SHAPE, 1.0), 99)
      .unwrap();
    assert_eq!(second.thread_count(), 10);
    assert_eq!(second.version(), 2);
    assert_eq!(session.current().unwrap().name(), "b");
  }

  #[test]
  fn failed_load_keeps_previous_model() {
    let session = session();
    session
      .load(&replay_asset("good", SSD_INPUT_SHAPE, 1.0), 2)
      .unwrap();
    let err = session
      .load(&replay_asset("bad", TensorShape::nhwc(224, 224, 3), 1.0), 2)
      .unwrap_err();
    assert!(matches!(err, LoadError::ShapeMismatch { .. }));
    assert!(matches!(
      session.load(&ModelAsset::from_bytes("junk", b"{".to_vec()), 2),
      Err(LoadError::Malformed(_))
    ));
    assert_eq!(session.current().unwrap().name(), "good");

    let input = InputTensor::zeroed(SSD_INPUT_SHAPE, TensorType::UInt8);
    let (outputs, elapsed) = session.infer_current(&input).unwrap();
    assert_eq!(outputs.count, 1.0);
    assert!(elapsed >= 0.0);
  }

  #[test]
  fn snapshot_survives_reload() {
    let session = session();
    let old = session
      .load(&replay_asset("old", SSD_INPUT_SHAPE, 1.0), 1)
      .unwrap();
    session
      .load(&replay_asset("new", SSD_INPUT_SHAPE, 0.0), 1)
      .unwrap();

    let input = InputTensor::zeroed(SSD_INPUT_SHAPE, TensorType::UInt8);
    let (outputs, _) = session.infer(&old, &input).unwrap();
    assert_eq!(outputs.count, 1.0);
    let (outputs, _) = session.infer_current(&input).unwrap();
    assert_eq!(outputs.count, 0.0);
  }

  #[test]
  fn engine_errors_are_not_fatal() {
    let session = session();
    session
      .load(&replay_asset("m", SSD_INPUT_SHAPE, 1.0), 1)
      .unwrap();
    let wrong = InputTensor::zeroed(SSD_INPUT_SHAPE, TensorType::Float32);
    assert!(matches!(
      session.infer_current(&wrong),
      Err(InferError::Engine(EngineError::InputMismatch(_)))
    ));
    let right = InputTensor::zeroed(SSD_INPUT_SHAPE, TensorType::UInt8);
    assert!(session.infer_current(&right).is_ok());
  }
}
