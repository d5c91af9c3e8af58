// 该文件是 Qianli （千里眼） 项目的一部分。
// src/frame.rs - 相机帧定义
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

use std::{sync::Arc, time::Duration};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  Rgb8,
  Bgr8,
  Rgba8,
  Bgra8,
  Gray8,
  /// 半平面 YUV 4:2:0，相机常见的原生格式，编码器不支持
  Nv12,
}

impl PixelFormat {
  /// 每像素字节数；平面格式返回 None
  pub fn bytes_per_pixel(&self) -> Option<usize> {
    match self {
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(3),
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(4),
      PixelFormat::Gray8 => Some(1),
      PixelFormat::Nv12 => None,
    }
  }
}

/// 相机帧
///
/// 创建之后不可修改。像素数据通过 `Arc` 共享，克隆开销很小。
#[derive(Debug, Clone)]
pub struct Frame {
  sequence: u64,
  timestamp: Duration,
  width: u32,
  height: u32,
  stride: usize,
  format: PixelFormat,
  data: Arc<[u8]>,
}

impl Frame {
  /// 紧密排列（无行填充）的帧
  pub fn new(
    sequence: u64,
    timestamp: Duration,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: impl Into<Arc<[u8]>>,
  ) -> Self {
    let stride = format.bytes_per_pixel().unwrap_or(1) * width as usize;
    Self::with_stride(sequence, timestamp, width, height, stride, format, data)
  }

  /// 指定行跨度（字节）的帧，相机缓冲区的每行末尾经常带有填充
  pub fn with_stride(
    sequence: u64,
    timestamp: Duration,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: impl Into<Arc<[u8]>>,
  ) -> Self {
    Self {
      sequence,
      timestamp,
      width,
      height,
      stride,
      format,
      data: data.into(),
    }
  }

  pub fn sequence(&self) -> u64 {
    self.sequence
  }

  pub fn timestamp(&self) -> Duration {
    self.timestamp
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// 第 `y` 行的像素数据（不含行尾填充）
  pub(crate) fn row(&self, y: usize, row_bytes: usize) -> Option<&[u8]> {
    let start = y.checked_mul(self.stride)?;
    self.data.get(start..start.checked_add(row_bytes)?)
  }
}
