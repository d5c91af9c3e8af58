// 该文件是 Qianli （千里眼） 项目的一部分。
// src/codec/labels.rs - 类别标签表
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

use std::path::Path;

/// 越界类别使用的标签
pub const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别索引到标签名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
  labels: Vec<String>,
}

impl Default for LabelMap {
  fn default() -> Self {
    Self::coco()
  }
}

impl LabelMap {
  pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn coco() -> Self {
    Self::new(COCO_CLASSES)
  }

  /// 每行一个标签；空行保留为空标签，以免后续索引错位
  pub fn parse(text: &str) -> Self {
    Self::new(text.lines().map(str::trim))
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(Self::parse(&text))
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  /// 查找引擎输出的类别值对应的标签，越界、负数或非有限值返回 [`UNKNOWN_LABEL`]
  pub fn label_for(&self, class: f32) -> &str {
    if !class.is_finite() || class < 0.0 {
      return UNKNOWN_LABEL;
    }
    self
      .labels
      .get(class.round() as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_lookup() {
    let labels = LabelMap::coco();
    assert_eq!(labels.len(), 80);
    assert_eq!(labels.label_for(0.0), "person");
    assert_eq!(labels.label_for(16.0), "dog");
    assert_eq!(labels.label_for(79.0), "toothbrush");
  }

  #[test]
  fn out_of_range_is_unknown() {
    let labels = LabelMap::coco();
    assert_eq!(labels.label_for(80.0), UNKNOWN_LABEL);
    assert_eq!(labels.label_for(-1.0), UNKNOWN_LABEL);
    assert_eq!(labels.label_for(f32::NAN), UNKNOWN_LABEL);
    assert_eq!(labels.label_for(f32::INFINITY), UNKNOWN_LABEL);
  }

  #[test]
  fn parse_keeps_blank_lines() {
    let labels = LabelMap::parse("cat\n\ndog\n");
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.label_for(1.0), "");
    assert_eq!(labels.label_for(2.0), "dog");
  }
}
