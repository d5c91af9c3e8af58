// 该文件是 Qianli （千里眼） 项目的一部分。
// tests/common/mod.rs - 测试公共设施
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

// 测试用的可观测推理引擎

#![allow(dead_code)]

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use qianli::{
  DetectionPipeline, Frame, InferenceResult, PipelineConfig, PipelineError, PixelFormat,
  codec::LabelMap,
  model::{
    Engine, EngineError, EngineFactory, EngineOptions, LoadError, MemoryAssetLoader, ModelAsset,
  },
  tensor::{InputTensor, RawOutputs, TensorShape},
};

pub const TEST_SHAPE: TensorShape = TensorShape::nhwc(8, 8, 3);

/// 记录引擎调用情况
#[derive(Default)]
pub struct Recorder {
  active: AtomicUsize,
  pub max_active: AtomicUsize,
  pub invocations: AtomicUsize,
  pub fail_next: AtomicBool,
  pub fail_load: AtomicBool,
  pub last_thread_count: AtomicUsize,
}

impl Recorder {
  pub fn max_active(&self) -> usize {
    self.max_active.load(Ordering::SeqCst)
  }

  pub fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }
}

/// 模型资源内容为 "<tag>"，输出的类别索引等于 tag，用来区分模型版本
pub struct CountingEngine {
  tag: f32,
  scores: Vec<f32>,
  delay: Duration,
  recorder: Arc<Recorder>,
}

impl Engine for CountingEngine {
  fn input_shape(&self) -> TensorShape {
    TEST_SHAPE
  }

  fn invoke(&mut self, input: &InputTensor) -> Result<RawOutputs, EngineError> {
    let active = self.recorder.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.recorder.max_active.fetch_max(active, Ordering::SeqCst);
    self.recorder.invocations.fetch_add(1, Ordering::SeqCst);

    thread::sleep(self.delay);
    let failed = self.recorder.fail_next.swap(false, Ordering::SeqCst);
    self.recorder.active.fetch_sub(1, Ordering::SeqCst);

    if failed {
      return Err(EngineError::Allocation("模拟分配失败".to_string()));
    }
    if input.shape() != TEST_SHAPE {
      return Err(EngineError::InputMismatch(input.shape().to_string()));
    }

    let n = self.scores.len();
    Ok(RawOutputs {
      boxes: (0..n).flat_map(|_| [0.1, 0.2, 0.6, 0.7]).collect(),
      classes: vec![self.tag; n],
      scores: self.scores.clone(),
      count: n as f32,
    })
  }
}

pub struct CountingFactory {
  pub recorder: Arc<Recorder>,
  pub delay: Duration,
  pub scores: Vec<f32>,
}

impl EngineFactory for CountingFactory {
  fn create(
    &self,
    asset: &ModelAsset,
    options: &EngineOptions,
  ) -> Result<Box<dyn Engine>, LoadError> {
    if self.recorder.fail_load.load(Ordering::SeqCst) {
      return Err(LoadError::malformed("模拟加载失败"));
    }
    let tag = std::str::from_utf8(asset.bytes())
      .ok()
      .and_then(|s| s.trim().parse::<f32>().ok())
      .ok_or_else(|| LoadError::malformed("无法解析模型标记"))?;
    self
      .recorder
      .last_thread_count
      .store(options.thread_count, Ordering::SeqCst);
    Ok(Box::new(CountingEngine {
      tag,
      scores: self.scores.clone(),
      delay: self.delay,
      recorder: self.recorder.clone(),
    }))
  }
}

/// 类别 1 -> "alpha"，类别 2 -> "beta"
pub fn labels() -> LabelMap {
  LabelMap::new(["none", "alpha", "beta"])
}

pub fn loader() -> MemoryAssetLoader {
  MemoryAssetLoader::default()
    .with_asset("alpha", b"1".to_vec())
    .with_asset("beta", b"2".to_vec())
    .with_asset("broken", b"not a tag".to_vec())
}

pub struct Harness {
  pub pipeline: DetectionPipeline,
  pub recorder: Arc<Recorder>,
  pub results: Receiver<InferenceResult>,
  pub errors: Receiver<String>,
}

pub fn harness(delay: Duration, scores: Vec<f32>) -> Harness {
  let recorder = Arc::new(Recorder::default());
  let factory = CountingFactory {
    recorder: recorder.clone(),
    delay,
    scores,
  };
  let config = PipelineConfig::default()
    .input_shape(TEST_SHAPE)
    .labels(labels());
  let pipeline = DetectionPipeline::new(config, Arc::new(loader()), Arc::new(factory)).unwrap();

  let (result_tx, results) = crossbeam_channel::unbounded();
  pipeline.set_result_sink(move |result: InferenceResult| {
    let _ = result_tx.send(result);
  });
  let (error_tx, errors) = crossbeam_channel::unbounded();
  pipeline.set_error_sink(move |e: &PipelineError| {
    let _ = error_tx.send(e.to_string());
  });

  Harness {
    pipeline,
    recorder,
    results,
    errors,
  }
}

pub fn frame(sequence: u64) -> Frame {
  Frame::new(
    sequence,
    Duration::from_millis(sequence * 33),
    16,
    12,
    PixelFormat::Bgra8,
    vec![128u8; 16 * 12 * 4],
  )
}

pub fn empty_frame(sequence: u64) -> Frame {
  Frame::new(sequence, Duration::ZERO, 0, 12, PixelFormat::Rgb8, Vec::<u8>::new())
}

/// 等待调度器回到空闲
pub fn wait_idle(pipeline: &DetectionPipeline) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while pipeline.is_busy() {
    assert!(Instant::now() < deadline, "流水线一直处于忙碌状态");
    thread::sleep(Duration::from_millis(1));
  }
}

pub const WAIT: Duration = Duration::from_secs(5);
