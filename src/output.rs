// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output.rs - 结果与错误输出
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

use tracing::warn;

use crate::{detection::InferenceResult, pipeline::PipelineError};

/// 结果接收端，例如叠加层渲染器或跨进程事件发送器
///
/// 只会在流水线的工作线程上被调用，不会与自身并发。实现不应长时间阻塞。
pub trait ResultSink: Send + Sync {
  fn emit(&self, result: InferenceResult);
}

impl<F> ResultSink for F
where
  F: Fn(InferenceResult) + Send + Sync,
{
  fn emit(&self, result: InferenceResult) {
    self(result)
  }
}

/// 错误通道。背压丢帧不会出现在这里。
pub trait ErrorSink: Send + Sync {
  fn report(&self, error: &PipelineError);
}

impl<F> ErrorSink for F
where
  F: Fn(&PipelineError) + Send + Sync,
{
  fn report(&self, error: &PipelineError) {
    self(error)
  }
}

/// 只写日志的错误通道
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
  fn report(&self, error: &PipelineError) {
    warn!("帧处理失败: {}", error);
  }
}

mod json_lines;
pub use self::json_lines::JsonLinesSink;
