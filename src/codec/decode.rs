// 该文件是 Qianli （千里眼） 项目的一部分。
// src/codec/decode.rs - 输出张量解码
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

use crate::{
  codec::{labels::LabelMap, palette},
  detection::{BoundingBox, Detection},
  tensor::RawOutputs,
};

/// 默认置信度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// 将四个输出张量解码为检测结果
///
/// 只读取 `count` 之前的条目，保留引擎的输出顺序，不做 NMS。
/// 纯函数：相同输入总是得到相同输出。
pub fn decode(outputs: &RawOutputs, threshold: f32, labels: &LabelMap) -> Vec<Detection> {
  let count = outputs.valid_count();
  let scores = &outputs.scores[..count];
  let classes = &outputs.classes[..count];
  let boxes = &outputs.boxes[..count * 4];

  scores
    .iter()
    .zip(classes)
    .zip(boxes.chunks_exact(4))
    .filter(|((score, _), _)| **score >= threshold)
    .map(|((&confidence, &class), b)| {
      let class_label = labels.label_for(class).to_string();
      let display_color = palette::color_for(&class_label);
      Detection {
        confidence,
        bounding_box: BoundingBox::clipped(b[0], b[1], b[2], b[3]),
        display_color,
        class_label,
      }
    })
    .collect()
}
