// 该文件是 Qianli （千里眼） 项目的一部分。
// tests/decode_props.rs - 解码性质测试
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

use proptest::prelude::*;
use qianli::{
  codec::{LabelMap, UNKNOWN_LABEL, decode, palette},
  tensor::RawOutputs,
};

fn raw_outputs() -> impl Strategy<Value = RawOutputs> {
  prop::collection::vec(
    (
      0.0f32..=1.0,
      -2.0f32..100.0,
      prop::array::uniform4(-0.5f32..1.5),
    ),
    0..32,
  )
  .prop_flat_map(|entries| {
    let n = entries.len();
    (Just(entries), 0..=n + 2)
  })
  .prop_map(|(entries, count)| RawOutputs {
    boxes: entries.iter().flat_map(|(_, _, b)| *b).collect(),
    classes: entries.iter().map(|(_, c, _)| *c).collect(),
    scores: entries.iter().map(|(s, _, _)| *s).collect(),
    count: count as f32,
  })
}

proptest! {
  #[test]
  fn decoded_entries_respect_count_and_threshold(
    outputs in raw_outputs(),
    threshold in 0.0f32..=1.0,
  ) {
    let labels = LabelMap::coco();
    let detections = decode(&outputs, threshold, &labels);

    let valid = outputs.valid_count();
    let expected: Vec<f32> = outputs.scores[..valid]
      .iter()
      .copied()
      .filter(|s| *s >= threshold)
      .collect();
    let confidences: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
    prop_assert_eq!(confidences, expected);

    for detection in &detections {
      let b = detection.bounding_box;
      for v in [b.top, b.left, b.bottom, b.right] {
        prop_assert!((0.0..=1.0).contains(&v));
      }
      prop_assert!(
        detection.class_label == UNKNOWN_LABEL
          || (0..labels.len() as u32).any(|i| labels.label_for(i as f32) == detection.class_label)
      );
      prop_assert_eq!(detection.display_color, palette::color_for(&detection.class_label));
    }
  }

  #[test]
  fn decode_is_deterministic(outputs in raw_outputs(), threshold in 0.0f32..=1.0) {
    let labels = LabelMap::coco();
    prop_assert_eq!(
      decode(&outputs, threshold, &labels),
      decode(&outputs, threshold, &labels)
    );
  }

  #[test]
  fn zero_threshold_keeps_every_valid_entry(outputs in raw_outputs()) {
    let detections = decode(&outputs, 0.0, &LabelMap::coco());
    prop_assert_eq!(detections.len(), outputs.valid_count());
  }
}
