// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 结果输出
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

use std::io::Write;

use parking_lot::Mutex;
use tracing::error;

use crate::{detection::InferenceResult, output::ResultSink};

/// 每个结果写一行 JSON
pub struct JsonLinesSink<W> {
  writer: Mutex<W>,
  /// 为 false 时跳过没有检测目标的结果
  always: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer: Mutex::new(writer),
      always: true,
    }
  }

  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn into_inner(self) -> W {
    self.writer.into_inner()
  }

  fn write(&self, result: &InferenceResult) -> Result<(), std::io::Error> {
    let mut writer = self.writer.lock();
    serde_json::to_writer(&mut *writer, result)?;
    writer.write_all(b"\n")?;
    writer.flush()
  }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
  fn emit(&self, result: InferenceResult) {
    if !self.always && result.is_empty() {
      return;
    }
    if let Err(e) = self.write(&result) {
      error!("写入帧 {} 的结果失败: {}", result.sequence, e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{BoundingBox, Detection, DisplayColor};

  fn result(sequence: u64, detections: Vec<Detection>) -> InferenceResult {
    InferenceResult {
      sequence,
      inference_time_ms: 12.5,
      detections,
    }
  }

  #[test]
  fn writes_one_line_per_result() {
    let sink = JsonLinesSink::new(Vec::new());
    let detection = Detection {
      confidence: 0.75,
      class_label: "cat".to_string(),
      bounding_box: BoundingBox::clipped(0.0, 0.0, 0.5, 0.5),
      display_color: DisplayColor([1, 2, 3]),
    };
    sink.emit(result(1, vec![detection]));
    sink.emit(result(2, vec![]));

    let text = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["sequence"], 1);
    assert_eq!(first["detections"][0]["class_label"], "cat");
    assert_eq!(first["detections"][0]["display_color"][2], 3);
  }

  #[test]
  fn skips_empty_results_unless_always() {
    let sink = JsonLinesSink::new(Vec::new()).always(false);
    sink.emit(result(1, vec![]));
    assert!(sink.into_inner().is_empty());
  }
}
