// 该文件是 Qianli （千里眼） 项目的一部分。
// src/detection.rs - 检测结果定义
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

/// 归一化边界框 `[top, left, bottom, right]`，各坐标均在 `[0, 1]` 内
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub top: f32,
  pub left: f32,
  pub bottom: f32,
  pub right: f32,
}

/// 像素坐标下的矩形，原点在左上角
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  /// 将引擎输出的坐标裁剪到 `[0, 1]`，NaN 视为 0
  pub fn clipped(top: f32, left: f32, bottom: f32, right: f32) -> Self {
    Self {
      top: clip_unit(top),
      left: clip_unit(left),
      bottom: clip_unit(bottom),
      right: clip_unit(right),
    }
  }

  /// 缩放到 `width x height` 的视口
  pub fn to_pixels(&self, width: f32, height: f32) -> PixelRect {
    PixelRect {
      x: self.left * width,
      y: self.top * height,
      width: (self.right - self.left).max(0.0) * width,
      height: (self.bottom - self.top).max(0.0) * height,
    }
  }
}

fn clip_unit(v: f32) -> f32 {
  if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// 显示颜色（RGB）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayColor(pub [u8; 3]);

impl fmt::Display for DisplayColor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [r, g, b] = self.0;
    write!(f, "#{:02X}{:02X}{:02X}", r, g, b)
  }
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub confidence: f32,
  pub class_label: String,
  pub bounding_box: BoundingBox,
  pub display_color: DisplayColor,
}

/// 一帧的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
  /// 对应帧的序号
  pub sequence: u64,
  /// 推理耗时（毫秒），不含编码与解码
  pub inference_time_ms: f64,
  /// 按引擎输出顺序排列
  pub detections: Vec<Detection>,
}

impl InferenceResult {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}
