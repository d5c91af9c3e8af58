// 该文件是 Qianli （千里眼） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

//! # 检测流水线
//!
//! `on_frame` 是唯一的入口。被调度器接纳的帧交给专用工作线程，依次执行
//! 编码、推理、解码，最后把结果交给 [`ResultSink`]。工作线程同一时刻只处理
//! 一帧，推理期间到达的帧全部丢弃。
//!
//! ```no_run
//! use std::sync::Arc;
//! use qianli::{
//!   config::PipelineConfig,
//!   model::{FsAssetLoader, ReplayFactory},
//!   pipeline::DetectionPipeline,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = DetectionPipeline::new(
//!   PipelineConfig::default().thread_count(4),
//!   Arc::new(FsAssetLoader::new("models").extension("json")),
//!   Arc::new(ReplayFactory),
//! )?;
//! pipeline.set_model("ssd_mobilenet", 4)?;
//! pipeline.set_result_sink(|result: qianli::detection::InferenceResult| {
//!   println!("{} 个目标", result.detections.len());
//! });
//! # Ok(())
//! # }
//! ```

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
  },
  thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  codec::{EncodeError, Encoder, LabelMap, decode},
  config::PipelineConfig,
  detection::InferenceResult,
  frame::Frame,
  model::{AssetLoader, EngineFactory, LoadError, clamp_thread_count},
  output::{ErrorSink, LogErrorSink, ResultSink},
  scheduler::{FrameScheduler, Permit, SchedulerStats},
  session::{InferError, InterpreterSession, LoadedModel},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("尚未加载任何模型")]
  NoModelLoaded,
  #[error("帧 {sequence} 编码失败: {source}")]
  Encode { sequence: u64, source: EncodeError },
  #[error("帧 {sequence} 推理失败: {source}")]
  Infer { sequence: u64, source: InferError },
  #[error("置信度阈值无效: {0}，应在 [0, 1] 内")]
  InvalidThreshold(f32),
  #[error("无法启动工作线程: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("帧 {sequence} 处理时发生 panic: {message}")]
  Panicked { sequence: u64, message: String },
  #[error("工作线程不可用")]
  WorkerUnavailable,
}

impl PipelineError {
  fn infer(sequence: u64, source: InferError) -> Self {
    match source {
      InferError::NoModelLoaded => PipelineError::NoModelLoaded,
      source => PipelineError::Infer { sequence, source },
    }
  }
}

/// `on_frame` 的结果；丢帧不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
  Admitted,
  Dropped,
}

fn check_threshold(threshold: f32) -> Result<f32, PipelineError> {
  if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
    Ok(threshold)
  } else {
    Err(PipelineError::InvalidThreshold(threshold))
  }
}

struct Shared {
  session: InterpreterSession,
  loader: Arc<dyn AssetLoader>,
  scheduler: FrameScheduler,
  labels: LabelMap,
  threshold: AtomicU32,
  // 未加载模型时 `set_thread_count` 的取值
  thread_count: AtomicUsize,
  result_sink: RwLock<Option<Arc<dyn ResultSink>>>,
  error_sink: RwLock<Arc<dyn ErrorSink>>,
}

/// 接纳时捕获的一帧工作，配置变更只影响之后接纳的帧
struct Job {
  frame: Frame,
  model: Arc<LoadedModel>,
  threshold: f32,
  result_sink: Option<Arc<dyn ResultSink>>,
  error_sink: Arc<dyn ErrorSink>,
  // 最后释放：处理结束（包括回调）后调度器才回到空闲
  _permit: Permit,
}

pub struct DetectionPipeline {
  shared: Arc<Shared>,
  jobs: Option<Sender<Job>>,
  worker: Option<JoinHandle<()>>,
}

impl DetectionPipeline {
  pub fn new(
    config: PipelineConfig,
    loader: Arc<dyn AssetLoader>,
    factory: Arc<dyn EngineFactory>,
  ) -> Result<Self, PipelineError> {
    let threshold = check_threshold(config.threshold)?;
    let shared = Arc::new(Shared {
      session: InterpreterSession::new(factory, config.input_shape),
      loader,
      scheduler: FrameScheduler::new(),
      labels: config.labels,
      threshold: AtomicU32::new(threshold.to_bits()),
      thread_count: AtomicUsize::new(clamp_thread_count(config.thread_count)),
      result_sink: RwLock::new(None),
      error_sink: RwLock::new(Arc::new(LogErrorSink)),
    });

    // 容量为 1 即可：许可释放前不会有第二个任务
    let (tx, rx) = crossbeam_channel::bounded::<Job>(1);
    let encoder = Encoder::new(config.input_shape, config.normalization, config.resize);
    let worker_shared = shared.clone();
    let worker = thread::Builder::new()
      .name(config.worker_name.clone())
      .spawn(move || run_worker(worker_shared, encoder, rx))?;
    info!(
      "检测流水线已启动: 输入 {}, 阈值 {}",
      config.input_shape, threshold
    );

    Ok(Self {
      shared,
      jobs: Some(tx),
      worker: Some(worker),
    })
  }

  /// 帧入口。可以从任意线程调用，不会阻塞调用方。
  pub fn on_frame(&self, frame: Frame) -> Result<FrameOutcome, PipelineError> {
    if !self.shared.session.is_loaded() {
      debug!("未加载模型，拒绝帧 {}", frame.sequence());
      return Err(PipelineError::NoModelLoaded);
    }
    let Some(permit) = self.shared.scheduler.try_admit() else {
      return Ok(FrameOutcome::Dropped);
    };

    let model = self
      .shared
      .session
      .current()
      .map_err(|e| PipelineError::infer(frame.sequence(), e))?;
    let sequence = frame.sequence();
    let job = Job {
      frame,
      model,
      threshold: self.threshold(),
      result_sink: self.shared.result_sink.read().clone(),
      error_sink: self.shared.error_sink.read().clone(),
      _permit: permit,
    };

    let jobs = self.jobs.as_ref().ok_or(PipelineError::WorkerUnavailable)?;
    jobs.try_send(job).map_err(|e| {
      error!("无法提交帧 {}: {}", sequence, e);
      PipelineError::WorkerUnavailable
    })?;
    debug!("接纳帧 {}", sequence);
    Ok(FrameOutcome::Admitted)
  }

  /// 按名称加载模型。已接纳的帧继续使用接纳时的模型。
  pub fn set_model(&self, name: &str, thread_count: usize) -> Result<u64, LoadError> {
    let asset = self
      .shared
      .loader
      .resolve(name)
      .inspect_err(|e| warn!("模型 {} 解析失败: {}", name, e))?;
    let model = self
      .shared
      .session
      .load(&asset, thread_count)
      .inspect_err(|e| warn!("模型 {} 加载失败，保留原模型: {}", name, e))?;

    self
      .shared
      .thread_count
      .store(model.thread_count(), Ordering::Relaxed);
    Ok(model.version())
  }

  /// 使用当前线程数加载模型
  pub fn set_model_file(&self, name: &str) -> Result<u64, LoadError> {
    self.set_model(name, self.thread_count())
  }

  /// 设置线程数；已有模型时用新线程数重新加载，加载失败则保持原线程数
  pub fn set_thread_count(&self, thread_count: usize) -> Result<(), LoadError> {
    let thread_count = clamp_thread_count(thread_count);
    match self.shared.session.current() {
      Ok(model) => self.set_model(model.name(), thread_count).map(|_| ()),
      Err(_) => {
        self
          .shared
          .thread_count
          .store(thread_count, Ordering::Relaxed);
        Ok(())
      }
    }
  }

  pub fn set_threshold(&self, threshold: f32) -> Result<(), PipelineError> {
    let threshold = check_threshold(threshold)?;
    self
      .shared
      .threshold
      .store(threshold.to_bits(), Ordering::Relaxed);
    Ok(())
  }

  pub fn set_result_sink<S: ResultSink + 'static>(&self, sink: S) {
    *self.shared.result_sink.write() = Some(Arc::new(sink));
  }

  pub fn clear_result_sink(&self) {
    *self.shared.result_sink.write() = None;
  }

  pub fn set_error_sink<S: ErrorSink + 'static>(&self, sink: S) {
    *self.shared.error_sink.write() = Arc::new(sink);
  }

  pub fn threshold(&self) -> f32 {
    f32::from_bits(self.shared.threshold.load(Ordering::Relaxed))
  }

  /// 当前模型使用的线程数；未加载时为待用的设置值
  pub fn thread_count(&self) -> usize {
    match self.shared.session.current() {
      Ok(model) => model.thread_count(),
      Err(_) => self.shared.thread_count.load(Ordering::Relaxed),
    }
  }

  /// 当前模型版本，未加载时为 None
  pub fn model_version(&self) -> Option<u64> {
    self.shared.session.current().ok().map(|m| m.version())
  }

  pub fn is_busy(&self) -> bool {
    self.shared.scheduler.is_busy()
  }

  pub fn stats(&self) -> SchedulerStats {
    self.shared.scheduler.stats()
  }

  /// 等待正在处理的帧完成后停止工作线程
  pub fn shutdown(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    // 关闭通道，工作线程处理完当前帧后退出
    self.jobs.take();
    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        error!("工作线程异常退出");
      } else {
        info!("检测流水线已停止");
      }
    }
  }
}

impl Drop for DetectionPipeline {
  fn drop(&mut self) {
    self.stop();
  }
}

fn run_worker(shared: Arc<Shared>, mut encoder: Encoder, jobs: Receiver<Job>) {
  debug!("工作线程启动");
  for job in jobs {
    let sequence = job.frame.sequence();
    let error_sink = job.error_sink.clone();
    // 引擎或回调 panic 时只丢弃这一帧，许可随任务一起释放
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process(&shared, &mut encoder, job)));
    if let Err(payload) = outcome {
      let e = PipelineError::Panicked {
        sequence,
        message: panic_message(payload.as_ref()),
      };
      error!("{}", e);
      if panic::catch_unwind(AssertUnwindSafe(|| error_sink.report(&e))).is_err() {
        error!("错误接收端 panic，忽略");
      }
    }
  }
  debug!("工作线程退出");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(msg) = payload.downcast_ref::<&str>() {
    msg.to_string()
  } else if let Some(msg) = payload.downcast_ref::<String>() {
    msg.clone()
  } else {
    "未知错误".to_string()
  }
}

fn process(shared: &Shared, encoder: &mut Encoder, job: Job) {
  let sequence = job.frame.sequence();
  let outcome = encoder
    .encode(&job.frame)
    .map_err(|source| PipelineError::Encode { sequence, source })
    .and_then(|tensor| {
      shared
        .session
        .infer(&job.model, tensor)
        .map_err(|e| PipelineError::infer(sequence, e))
    });

  match outcome {
    Ok((outputs, inference_time_ms)) => {
      let detections = decode(&outputs, job.threshold, &shared.labels);
      debug!(
        "帧 {}: {} 个目标，推理耗时 {:.2} ms",
        sequence,
        detections.len(),
        inference_time_ms
      );
      let result = InferenceResult {
        sequence,
        inference_time_ms,
        detections,
      };
      match &job.result_sink {
        Some(sink) => sink.emit(result),
        None => debug!("未设置结果接收端，丢弃帧 {} 的结果", sequence),
      }
    }
    Err(e) => {
      warn!("丢弃帧 {}: {}", sequence, e);
      job.error_sink.report(&e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_bounds() {
    assert!(check_threshold(0.0).is_ok());
    assert!(check_threshold(1.0).is_ok());
    assert!(matches!(
      check_threshold(1.5),
      Err(PipelineError::InvalidThreshold(_))
    ));
    assert!(check_threshold(-0.1).is_err());
    assert!(check_threshold(f32::NAN).is_err());
  }

  #[test]
  fn panic_payload_is_readable() {
    let payload = panic::catch_unwind(|| panic!("坏帧 {}", 7)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "坏帧 7");
    let payload = panic::catch_unwind(|| panic!("静态消息")).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "静态消息");
  }

  #[test]
  fn no_model_maps_to_pipeline_variant() {
    assert!(matches!(
      PipelineError::infer(3, InferError::NoModelLoaded),
      PipelineError::NoModelLoaded
    ));
    assert!(matches!(
      PipelineError::infer(3, InferError::MalformedOutput(String::new())),
      PipelineError::Infer { sequence: 3, .. }
    ));
  }
}
