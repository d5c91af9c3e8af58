// 该文件是 Qianli （千里眼） 项目的一部分。
// src/config.rs - 流水线配置
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
  codec::{DEFAULT_THRESHOLD, LabelMap, Normalization, ResizeMode},
  model::clamp_thread_count,
  tensor::{SSD_INPUT_SHAPE, TensorShape},
};

const DEFAULT_THREAD_COUNT: usize = 1;
const DEFAULT_WORKER_NAME: &str = "qianli-worker";

/// 流水线配置，只在内存中有效
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub threshold: f32,
  pub thread_count: usize,
  pub input_shape: TensorShape,
  pub normalization: Normalization,
  pub resize: ResizeMode,
  pub labels: LabelMap,
  pub worker_name: String,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      thread_count: DEFAULT_THREAD_COUNT,
      input_shape: SSD_INPUT_SHAPE,
      normalization: Normalization::default(),
      resize: ResizeMode::default(),
      labels: LabelMap::default(),
      worker_name: DEFAULT_WORKER_NAME.to_string(),
    }
  }
}

impl PipelineConfig {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn thread_count(mut self, thread_count: usize) -> Self {
    self.thread_count = clamp_thread_count(thread_count);
    self
  }

  pub fn input_shape(mut self, input_shape: TensorShape) -> Self {
    self.input_shape = input_shape;
    self
  }

  pub fn normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn resize(mut self, resize: ResizeMode) -> Self {
    self.resize = resize;
    self
  }

  pub fn labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  pub fn worker_name(mut self, worker_name: impl Into<String>) -> Self {
    self.worker_name = worker_name.into();
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reference_model() {
    let config = PipelineConfig::default();
    assert_eq!(config.threshold, 0.5);
    assert_eq!(config.input_shape, TensorShape::nhwc(300, 300, 3));
    assert_eq!(config.labels.len(), 80);
  }

  #[test]
  fn builder_clamps_thread_count() {
    assert_eq!(PipelineConfig::default().thread_count(0).thread_count, 1);
    assert_eq!(PipelineConfig::default().thread_count(32).thread_count, 10);
  }
}
