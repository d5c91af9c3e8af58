// 该文件是 Qianli （千里眼） 项目的一部分。
// src/bin/simple_replay.rs - 以固定帧率把图像送入检测流水线
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

use std::{
  io::Write,
  path::PathBuf,
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use qianli::{
  PipelineConfig, PipelineError,
  codec::{LabelMap, ResizeMode},
  input::ImageFileInput,
  model::{EngineFactory, FsAssetLoader, ReplayFactory},
  output::JsonLinesSink,
  pipeline::DetectionPipeline,
};

/// 推理引擎
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum EngineKind {
  /// JSON 回放模型（`<name>.json`）
  Replay,
  /// ONNX 模型（`<name>.onnx`）
  #[cfg(feature = "model_onnx")]
  Onnx,
}

impl EngineKind {
  fn extension(self) -> &'static str {
    match self {
      EngineKind::Replay => "json",
      #[cfg(feature = "model_onnx")]
      EngineKind::Onnx => "onnx",
    }
  }

  fn factory(self) -> Arc<dyn EngineFactory> {
    match self {
      EngineKind::Replay => Arc::new(ReplayFactory),
      #[cfg(feature = "model_onnx")]
      EngineKind::Onnx => Arc::new(qianli::model::OnnxFactory::new()),
    }
  }
}

/// Qianli 回放参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录
  #[arg(long, value_name = "DIR")]
  pub model_dir: PathBuf,
  /// 模型名称（不含扩展名）
  #[arg(long, value_name = "MODEL")]
  pub model: String,
  /// 推理引擎
  #[arg(long, value_enum, default_value = "replay")]
  pub engine: EngineKind,
  /// 输入图像文件或目录
  #[arg(long, value_name = "SOURCE")]
  pub input: PathBuf,
  /// 结果输出文件，缺省时写到标准输出
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<PathBuf>,
  /// 标签文件，每行一个类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 推理线程数 (1 - 10)
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub threads: usize,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: f32,
  /// 模拟的相机帧率
  #[arg(long, default_value = "30", value_name = "FPS")]
  pub fps: u32,
  /// 居中裁剪而不是拉伸
  #[arg(long)]
  pub center_crop: bool,
  /// 最大送入帧数，设置后输入会循环播放
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.model_dir.display());
  info!("模型名称: {}", args.model);
  info!("输入来源: {}", args.input.display());

  let labels = match &args.labels {
    Some(path) => LabelMap::from_file(path)
      .with_context(|| format!("无法读取标签文件 {}", path.display()))?,
    None => LabelMap::coco(),
  };
  let resize = if args.center_crop {
    ResizeMode::CenterCrop
  } else {
    ResizeMode::Stretch
  };
  let config = PipelineConfig::default()
    .threshold(args.threshold)
    .thread_count(args.threads)
    .resize(resize)
    .labels(labels);

  let loader = FsAssetLoader::new(&args.model_dir).extension(args.engine.extension());
  let pipeline = DetectionPipeline::new(config, Arc::new(loader), args.engine.factory())?;
  pipeline.set_model(&args.model, args.threads)?;

  let writer: Box<dyn Write + Send> = match &args.output {
    Some(path) => Box::new(
      std::fs::File::create(path)
        .with_context(|| format!("无法创建输出文件 {}", path.display()))?,
    ),
    None => Box::new(std::io::stdout()),
  };
  pipeline.set_result_sink(JsonLinesSink::new(writer));
  pipeline.set_error_sink(|e: &PipelineError| warn!("帧处理失败: {}", e));

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })
  .context("无法设置 Ctrl-C 处理器")?;

  let input = ImageFileInput::open(&args.input)?
    .repeat(args.frame_number.is_some())
    .skip_unreadable();
  let period = Duration::from_secs(1) / args.fps.max(1);
  let started = Instant::now();
  let mut fed = 0usize;

  for frame in input {
    // 单个文件读取失败已在输入端记录并跳过，这里只剩整轮都失败的情况
    let frame = frame?;
    let tick = Instant::now();
    pipeline.on_frame(frame)?;
    fed += 1;

    if args.frame_number.map(|n| fed >= n).unwrap_or(false) {
      info!("达到指定帧数 {}, 停止送帧", fed);
      break;
    }
    if rx.try_recv().is_ok() {
      warn!("中断信号接收，停止送帧");
      break;
    }
    if let Some(rest) = period.checked_sub(tick.elapsed()) {
      thread::sleep(rest);
    }
  }

  let stats = pipeline.stats();
  pipeline.shutdown();

  info!(
    "处理完成: 送入 {} 帧, 接纳 {} 帧, 丢弃 {} 帧, 用时 {:.2?}",
    stats.arrived,
    stats.admitted,
    stats.dropped,
    started.elapsed()
  );
  Ok(())
}
