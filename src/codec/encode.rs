// 该文件是 Qianli （千里眼） 项目的一部分。
// src/codec/encode.rs - 帧到输入张量的编码
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

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{Frame, PixelFormat},
  tensor::{InputTensor, TensorData, TensorShape, TensorType},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("不支持的像素格式: {0:?}")]
  UnsupportedFormat(PixelFormat),
  #[error("帧数据长度不足: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferTooShort { expected: usize, actual: usize },
  #[error("行跨度 {stride} 小于一行像素所需的 {row_bytes} 字节")]
  InvalidStride { stride: usize, row_bytes: usize },
  #[error("不支持的模型输入通道数: {0}")]
  UnsupportedChannels(usize),
}

/// 像素值归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
  /// 保持 0..=255 的 u8，用于量化模型
  #[default]
  None,
  /// f32，映射到 `[0, 1]`
  UnitRange,
  /// f32，映射到 `[-1, 1]`
  Symmetric,
}

impl Normalization {
  pub fn tensor_type(&self) -> TensorType {
    match self {
      Normalization::None => TensorType::UInt8,
      Normalization::UnitRange | Normalization::Symmetric => TensorType::Float32,
    }
  }

  fn apply(&self, value: u8) -> f32 {
    match self {
      Normalization::None => value as f32,
      Normalization::UnitRange => value as f32 / 255.0,
      Normalization::Symmetric => value as f32 / 127.5 - 1.0,
    }
  }
}

/// 缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
  /// 直接拉伸到模型输入尺寸，边界框相对整帧
  #[default]
  Stretch,
  /// 先裁剪出与模型输入宽高比一致的居中区域，边界框相对该区域
  CenterCrop,
}

/// 帧编码器
///
/// 持有唯一一块输入张量缓冲区，每次编码时覆盖。
#[derive(Debug)]
pub struct Encoder {
  normalization: Normalization,
  resize: ResizeMode,
  tensor: InputTensor,
}

impl Encoder {
  pub fn new(shape: TensorShape, normalization: Normalization, resize: ResizeMode) -> Self {
    Self {
      normalization,
      resize,
      tensor: InputTensor::zeroed(shape, normalization.tensor_type()),
    }
  }

  pub fn shape(&self) -> TensorShape {
    self.tensor.shape()
  }

  pub fn encode(&mut self, frame: &Frame) -> Result<&InputTensor, EncodeError> {
    let shape = self.tensor.shape();
    if shape.channels != 1 && shape.channels != 3 {
      return Err(EncodeError::UnsupportedChannels(shape.channels));
    }

    let rgb = to_rgb_image(frame)?;
    let rgb = match self.resize {
      ResizeMode::Stretch => rgb,
      ResizeMode::CenterCrop => center_crop(rgb, shape.width as u32, shape.height as u32),
    };
    let (target_w, target_h) = (shape.width as u32, shape.height as u32);
    let resized = if rgb.dimensions() == (target_w, target_h) {
      rgb
    } else {
      imageops::resize(&rgb, target_w, target_h, FilterType::Triangle)
    };
    debug!(
      "帧 {} 编码: {}x{} -> {}",
      frame.sequence(),
      frame.width(),
      frame.height(),
      shape
    );

    let channels = shape.channels;
    let normalization = self.normalization;
    match self.tensor.data_mut() {
      TensorData::UInt8(buf) => {
        for (dst, px) in buf.chunks_exact_mut(channels).zip(resized.pixels()) {
          write_channels(dst, px.0, |v| v);
        }
      }
      TensorData::Float32(buf) => {
        for (dst, px) in buf.chunks_exact_mut(channels).zip(resized.pixels()) {
          write_channels(dst, px.0, |v| normalization.apply(v));
        }
      }
    }

    Ok(&self.tensor)
  }
}

fn write_channels<T>(dst: &mut [T], rgb: [u8; 3], f: impl Fn(u8) -> T) {
  if dst.len() == 1 {
    dst[0] = f(luma(rgb));
  } else {
    for (d, v) in dst.iter_mut().zip(rgb) {
      *d = f(v);
    }
  }
}

// BT.601
fn luma([r, g, b]: [u8; 3]) -> u8 {
  (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}

fn validate(frame: &Frame) -> Result<usize, EncodeError> {
  let (width, height) = (frame.width(), frame.height());
  if width == 0 || height == 0 {
    return Err(EncodeError::EmptyFrame { width, height });
  }
  let bpp = frame
    .format()
    .bytes_per_pixel()
    .ok_or(EncodeError::UnsupportedFormat(frame.format()))?;

  let row_bytes = bpp.saturating_mul(width as usize);
  if frame.stride() < row_bytes {
    return Err(EncodeError::InvalidStride {
      stride: frame.stride(),
      row_bytes,
    });
  }
  // 最后一行不要求带填充；溢出时饱和，必然超过实际长度
  let expected = frame
    .stride()
    .saturating_mul(height as usize - 1)
    .saturating_add(row_bytes);
  if frame.data().len() < expected {
    return Err(EncodeError::BufferTooShort {
      expected,
      actual: frame.data().len(),
    });
  }
  Ok(bpp)
}

/// 转换为紧密排列的 RGB 图像
fn to_rgb_image(frame: &Frame) -> Result<RgbImage, EncodeError> {
  let bpp = validate(frame)?;
  let (width, height) = (frame.width(), frame.height());
  let row_bytes = bpp * width as usize;
  let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);

  for y in 0..height as usize {
    let row = frame.row(y, row_bytes).ok_or(EncodeError::BufferTooShort {
      expected: frame.stride().saturating_mul(y).saturating_add(row_bytes),
      actual: frame.data().len(),
    })?;
    for px in row.chunks_exact(bpp) {
      let pixel = match frame.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => [px[0], px[1], px[2]],
        PixelFormat::Bgr8 | PixelFormat::Bgra8 => [px[2], px[1], px[0]],
        PixelFormat::Gray8 => [px[0], px[0], px[0]],
        PixelFormat::Nv12 => return Err(EncodeError::UnsupportedFormat(PixelFormat::Nv12)),
      };
      rgb.extend_from_slice(&pixel);
    }
  }

  let expected = rgb.len();
  RgbImage::from_raw(width, height, rgb).ok_or(EncodeError::BufferTooShort {
    expected: width as usize * height as usize * 3,
    actual: expected,
  })
}

/// 裁剪出与 `target_w:target_h` 宽高比一致的最大居中区域
fn center_crop(image: RgbImage, target_w: u32, target_h: u32) -> RgbImage {
  let (w, h) = image.dimensions();
  let (w64, h64) = (w as u64, h as u64);
  let (tw, th) = (target_w.max(1) as u64, target_h.max(1) as u64);

  let (crop_w, crop_h) = if w64 * th > h64 * tw {
    (((h64 * tw) / th).max(1) as u32, h)
  } else {
    (w, ((w64 * th) / tw).max(1) as u32)
  };
  if (crop_w, crop_h) == (w, h) {
    return image;
  }

  let x = (w - crop_w) / 2;
  let y = (h - crop_h) / 2;
  imageops::crop_imm(&image, x, y, crop_w, crop_h).to_image()
}
