// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/replay.rs - 回放引擎
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

//! # 回放引擎
//!
//! 模型资源是一个 JSON 文档，记录了输入形状、模拟的推理耗时以及若干组
//! 预先录制的输出张量。每次推理按顺序循环返回下一组输出。
//!
//! 用于没有加速硬件的机器上的基准测试和演练：
//!
//! ```json
//! {
//!   "input_shape": { "batch": 1, "height": 300, "width": 300, "channels": 3 },
//!   "input_type": "UInt8",
//!   "latency_ms": 30,
//!   "outputs": [
//!     { "boxes": [0.1, 0.1, 0.5, 0.5], "classes": [0], "scores": [0.9], "count": 1 }
//!   ]
//! }
//! ```

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  model::{Engine, EngineError, EngineFactory, EngineOptions, LoadError, ModelAsset},
  tensor::{InputTensor, RawOutputs, SSD_INPUT_SHAPE, TensorShape, TensorType},
};

fn default_input_shape() -> TensorShape {
  SSD_INPUT_SHAPE
}

fn default_input_type() -> TensorType {
  TensorType::UInt8
}

/// 回放模型描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayModel {
  #[serde(default = "default_input_shape")]
  pub input_shape: TensorShape,
  #[serde(default = "default_input_type")]
  pub input_type: TensorType,
  #[serde(default)]
  pub latency_ms: u64,
  pub outputs: Vec<RawOutputs>,
}

impl ReplayModel {
  pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
    let model: ReplayModel = serde_json::from_slice(bytes)
      .map_err(|e| LoadError::malformed(format!("回放模型解析失败: {}", e)))?;
    if model.outputs.is_empty() {
      return Err(LoadError::malformed("回放模型没有任何输出记录"));
    }
    for (idx, outputs) in model.outputs.iter().enumerate() {
      outputs
        .check_layout()
        .map_err(|e| LoadError::malformed(format!("第 {} 组输出无效: {}", idx, e)))?;
    }
    Ok(model)
  }

  pub fn to_json(&self) -> Vec<u8> {
    // 纯数据结构，序列化不会失败
    serde_json::to_vec(self).unwrap_or_default()
  }
}

pub struct ReplayEngine {
  model: ReplayModel,
  cursor: usize,
}

impl ReplayEngine {
  pub fn new(model: ReplayModel) -> Self {
    Self { model, cursor: 0 }
  }
}

impl Engine for ReplayEngine {
  fn input_shape(&self) -> TensorShape {
    self.model.input_shape
  }

  fn invoke(&mut self, input: &InputTensor) -> Result<RawOutputs, EngineError> {
    if input.shape() != self.model.input_shape {
      return Err(EngineError::InputMismatch(format!(
        "期望形状 {}, 实际 {}",
        self.model.input_shape,
        input.shape()
      )));
    }
    if input.tensor_type() != self.model.input_type {
      return Err(EngineError::InputMismatch(format!(
        "期望类型 {:?}, 实际 {:?}",
        self.model.input_type,
        input.tensor_type()
      )));
    }

    if self.model.latency_ms > 0 {
      thread::sleep(Duration::from_millis(self.model.latency_ms));
    }

    let outputs = self.model.outputs[self.cursor].clone();
    self.cursor = (self.cursor + 1) % self.model.outputs.len();
    Ok(outputs)
  }
}

/// 构建 [`ReplayEngine`] 的工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayFactory;

impl EngineFactory for ReplayFactory {
  fn create(
    &self,
    asset: &ModelAsset,
    options: &EngineOptions,
  ) -> Result<Box<dyn Engine>, LoadError> {
    info!("加载回放模型: {}", asset.name());
    let model = ReplayModel::parse(asset.bytes())?;
    // 回放引擎不使用多线程，线程数仅记录
    debug!(
      "回放模型: 输入 {}, 延迟 {} ms, {} 组输出, 线程数 {}",
      model.input_shape,
      model.latency_ms,
      model.outputs.len(),
      options.thread_count
    );
    Ok(Box::new(ReplayEngine::new(model)))
  }
}
