// 该文件是 Qianli （千里眼） 项目的一部分。
// src/tensor.rs - 输入/输出张量定义
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

use std::fmt;

use serde::{Deserialize, Serialize};

/// NHWC 张量形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
  pub batch: usize,
  pub height: usize,
  pub width: usize,
  pub channels: usize,
}

/// 参考 SSD 模型的输入形状 `[1, 300, 300, 3]`
pub const SSD_INPUT_SHAPE: TensorShape = TensorShape::nhwc(300, 300, 3);

impl TensorShape {
  pub const fn nhwc(height: usize, width: usize, channels: usize) -> Self {
    Self {
      batch: 1,
      height,
      width,
      channels,
    }
  }

  /// 元素个数
  pub fn len(&self) -> usize {
    self.batch * self.height * self.width * self.channels
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl fmt::Display for TensorShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{}, {}, {}, {}]",
      self.batch, self.height, self.width, self.channels
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorType {
  UInt8,
  Float32,
}

#[derive(Debug, Clone)]
pub(crate) enum TensorData {
  UInt8(Box<[u8]>),
  Float32(Box<[f32]>),
}

/// 模型输入张量，NHWC 行优先、通道交错排列
///
/// 由编码器独占，每次编码都会覆盖其内容。
#[derive(Debug, Clone)]
pub struct InputTensor {
  shape: TensorShape,
  data: TensorData,
}

impl InputTensor {
  pub fn zeroed(shape: TensorShape, tensor_type: TensorType) -> Self {
    let data = match tensor_type {
      TensorType::UInt8 => TensorData::UInt8(vec![0u8; shape.len()].into_boxed_slice()),
      TensorType::Float32 => TensorData::Float32(vec![0f32; shape.len()].into_boxed_slice()),
    };
    Self { shape, data }
  }

  pub fn shape(&self) -> TensorShape {
    self.shape
  }

  pub fn tensor_type(&self) -> TensorType {
    match self.data {
      TensorData::UInt8(_) => TensorType::UInt8,
      TensorData::Float32(_) => TensorType::Float32,
    }
  }

  pub fn as_u8(&self) -> Option<&[u8]> {
    match &self.data {
      TensorData::UInt8(data) => Some(&data[..]),
      TensorData::Float32(_) => None,
    }
  }

  pub fn as_f32(&self) -> Option<&[f32]> {
    match &self.data {
      TensorData::Float32(data) => Some(&data[..]),
      TensorData::UInt8(_) => None,
    }
  }

  pub(crate) fn data_mut(&mut self) -> &mut TensorData {
    &mut self.data
  }
}

/// 一次推理产生的四个输出张量
///
/// - `boxes`: `N_max * 4`，每组为归一化的 `[top, left, bottom, right]`
/// - `classes`: `N_max`，整数值的类别索引
/// - `scores`: `N_max`，置信度
/// - `count`: 有效条目数，`count` 之后的条目未定义
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutputs {
  pub boxes: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  pub count: f32,
}

impl RawOutputs {
  /// 缓冲区可容纳的最大检测数 `N_max`
  pub fn max_detections(&self) -> usize {
    (self.boxes.len() / 4)
      .min(self.classes.len())
      .min(self.scores.len())
  }

  /// 截断到 `[0, N_max]` 的有效条目数；非有限值或负数视为 0
  pub fn valid_count(&self) -> usize {
    if !self.count.is_finite() || self.count < 0.0 {
      return 0;
    }
    (self.count as usize).min(self.max_detections())
  }

  /// 检查四个张量之间的尺寸是否一致
  pub fn check_layout(&self) -> Result<(), String> {
    let n = self.scores.len();
    if self.classes.len() != n || self.boxes.len() != n * 4 {
      return Err(format!(
        "输出张量尺寸不一致: boxes={}, classes={}, scores={}",
        self.boxes.len(),
        self.classes.len(),
        n
      ));
    }
    if !self.count.is_finite() || self.count < 0.0 || self.count > n as f32 {
      return Err(format!("检测数量 {} 超出范围 [0, {}]", self.count, n));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shape_display_and_len() {
    assert_eq!(SSD_INPUT_SHAPE.to_string(), "[1, 300, 300, 3]");
    assert_eq!(SSD_INPUT_SHAPE.len(), 270_000);
  }

  #[test]
  fn zeroed_tensor_has_requested_type() {
    let tensor = InputTensor::zeroed(TensorShape::nhwc(2, 2, 3), TensorType::Float32);
    assert_eq!(tensor.as_f32().map(|d| d.len()), Some(12));
    assert!(tensor.as_u8().is_none());
  }

  #[test]
  fn valid_count_is_clamped() {
    let outputs = RawOutputs {
      boxes: vec![0.0; 8],
      classes: vec![0.0; 2],
      scores: vec![0.0; 2],
      count: 5.0,
    };
    assert_eq!(outputs.valid_count(), 2);
    assert!(outputs.check_layout().is_err());

    let nan = RawOutputs {
      count: f32::NAN,
      ..outputs.clone()
    };
    assert_eq!(nan.valid_count(), 0);
  }

  #[test]
  fn layout_mismatch_is_reported() {
    let outputs = RawOutputs {
      boxes: vec![0.0; 4],
      classes: vec![0.0; 2],
      scores: vec![0.0; 2],
      count: 1.0,
    };
    assert!(outputs.check_layout().is_err());
  }
}
