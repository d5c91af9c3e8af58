// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

//! # ONNX Runtime 引擎
//!
//! 在 CPU 上运行 SSD 风格的检测模型：一个 NHWC 输入，四个输出
//! （boxes `[1, N, 4]`、classes `[1, N]`、scores `[1, N]`、count `[1]`）。
//! 输出按名称匹配（包含 `box` / `class` / `score` / `num` 或 `count`），
//! 名称无法识别时按上述顺序取前四个。

use ort::{
  session::Session,
  value::{DynValue, Tensor},
};
use tracing::{debug, info};

use crate::{
  model::{Engine, EngineError, EngineFactory, EngineOptions, LoadError, ModelAsset},
  tensor::{InputTensor, RawOutputs, SSD_INPUT_SHAPE, TensorShape, TensorType},
};

/// 四个输出张量在模型中的名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  pub boxes: String,
  pub classes: String,
  pub scores: String,
  pub count: String,
}

impl OutputLayout {
  pub fn from_names(names: &[String]) -> Result<Self, LoadError> {
    if names.len() < 4 {
      return Err(LoadError::malformed(format!(
        "检测模型需要 4 个输出，实际 {} 个",
        names.len()
      )));
    }
    let find = |keys: &[&str], fallback: usize| {
      names
        .iter()
        .find(|name| {
          let name = name.to_ascii_lowercase();
          keys.iter().any(|key| name.contains(key))
        })
        .unwrap_or(&names[fallback])
        .clone()
    };
    Ok(Self {
      boxes: find(&["box"], 0),
      classes: find(&["class"], 1),
      scores: find(&["score"], 2),
      count: find(&["num", "count"], 3),
    })
  }
}

pub struct OnnxEngine {
  session: Session,
  layout: OutputLayout,
  input_shape: TensorShape,
  input_type: TensorType,
}

impl OnnxEngine {
  fn input_value(&self, input: &InputTensor) -> Result<DynValue, EngineError> {
    if input.shape() != self.input_shape || input.tensor_type() != self.input_type {
      return Err(EngineError::InputMismatch(format!(
        "期望 {} {:?}, 实际 {} {:?}",
        self.input_shape,
        self.input_type,
        input.shape(),
        input.tensor_type()
      )));
    }
    let s = input.shape();
    let shape = vec![
      s.batch as i64,
      s.height as i64,
      s.width as i64,
      s.channels as i64,
    ];
    let value = match (input.as_u8(), input.as_f32()) {
      (Some(data), _) => Tensor::from_array((shape, data.to_vec())).map(|t| t.into_dyn()),
      (_, Some(data)) => Tensor::from_array((shape, data.to_vec())).map(|t| t.into_dyn()),
      (None, None) => return Err(EngineError::InputMismatch("空输入张量".to_string())),
    };
    value.map_err(|e| EngineError::Allocation(e.to_string()))
  }
}

impl Engine for OnnxEngine {
  fn input_shape(&self) -> TensorShape {
    self.input_shape
  }

  fn invoke(&mut self, input: &InputTensor) -> Result<RawOutputs, EngineError> {
    let value = self.input_value(input)?;
    let outputs = self
      .session
      .run(ort::inputs![value])
      .map_err(|e| EngineError::Invoke(e.to_string()))?;

    let extract = |name: &str| -> Result<Vec<f32>, EngineError> {
      let (_, data) = outputs[name]
        .try_extract_tensor::<f32>()
        .map_err(|e| EngineError::Invoke(format!("输出 {} 读取失败: {}", name, e)))?;
      Ok(data.to_vec())
    };
    let boxes = extract(&self.layout.boxes)?;
    let classes = extract(&self.layout.classes)?;
    let scores = extract(&self.layout.scores)?;
    let count = extract(&self.layout.count)?
      .first()
      .copied()
      .unwrap_or_default();

    Ok(RawOutputs {
      boxes,
      classes,
      scores,
      count,
    })
  }
}

/// 构建 [`OnnxEngine`] 的工厂
///
/// 线程数传给 ONNX Runtime 的算子内线程池。
#[derive(Debug, Clone, Copy)]
pub struct OnnxFactory {
  input_shape: TensorShape,
  input_type: TensorType,
}

impl Default for OnnxFactory {
  fn default() -> Self {
    Self {
      input_shape: SSD_INPUT_SHAPE,
      input_type: TensorType::UInt8,
    }
  }
}

impl OnnxFactory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn input_shape(mut self, input_shape: TensorShape) -> Self {
    self.input_shape = input_shape;
    self
  }

  /// 浮点模型需要与 `Normalization` 一致的 `Float32`
  pub fn input_type(mut self, input_type: TensorType) -> Self {
    self.input_type = input_type;
    self
  }
}

impl EngineFactory for OnnxFactory {
  fn create(
    &self,
    asset: &ModelAsset,
    options: &EngineOptions,
  ) -> Result<Box<dyn Engine>, LoadError> {
    info!(
      "加载 ONNX 模型: {} ({} 字节, 线程数 {})",
      asset.name(),
      asset.bytes().len(),
      options.thread_count
    );
    let builder = Session::builder()
      .map_err(|e| LoadError::malformed(format!("无法创建 ONNX 会话: {}", e)))?;
    let mut builder = builder
      .with_intra_threads(options.thread_count)
      .map_err(|e| LoadError::malformed(format!("无法设置线程数: {}", e)))?;
    let session = builder
      .commit_from_memory(asset.bytes())
      .map_err(|e| LoadError::malformed(format!("ONNX 模型加载失败: {}", e)))?;

    let names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    let layout = OutputLayout::from_names(&names)?;
    debug!("ONNX 输出映射: {:?}", layout);

    let mut engine = OnnxEngine {
      session,
      layout,
      input_shape: self.input_shape,
      input_type: self.input_type,
    };

    // 用全零输入预热一次，模型不接受该输入形状时在加载阶段失败
    let warmup = InputTensor::zeroed(self.input_shape, self.input_type);
    let outputs = engine.invoke(&warmup).map_err(|e| {
      LoadError::malformed(format!(
        "模型不接受输入 {} {:?}: {}",
        self.input_shape, self.input_type, e
      ))
    })?;
    outputs
      .check_layout()
      .map_err(|e| LoadError::malformed(format!("模型输出不符合检测约定: {}", e)))?;

    Ok(Box::new(engine))
  }
}
