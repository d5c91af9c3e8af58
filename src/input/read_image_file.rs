// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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
  path::{Path, PathBuf},
  time::Instant,
};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::frame::{Frame, PixelFormat};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像读取错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("没有可用的图像文件: {0}")]
  NoImages(String),
  #[error("连续 {0} 个图像文件都无法读取")]
  NoReadableImages(usize),
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// 把单个图像文件或目录中的图像（按文件名排序）当作相机帧序列
pub struct ImageFileInput {
  files: Vec<PathBuf>,
  cursor: usize,
  sequence: u64,
  repeat: bool,
  started: Instant,
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image(p))
        .collect::<Vec<_>>();
      files.sort();
      files
    } else {
      vec![path.to_path_buf()]
    };

    if files.is_empty() {
      error!("目录中没有图像文件: {}", path.display());
      return Err(ImageFileInputError::NoImages(path.display().to_string()));
    }
    debug!("图像输入: {} 个文件", files.len());

    Ok(Self {
      files,
      cursor: 0,
      sequence: 0,
      repeat: false,
      started: Instant::now(),
    })
  }

  /// 读完后从头开始循环
  pub fn repeat(mut self, repeat: bool) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// 跳过无法读取的文件，只产出可用帧
  ///
  /// 连续失败次数达到文件总数（整轮都读不出来）时产出
  /// [`ImageFileInputError::NoReadableImages`] 并结束。
  pub fn skip_unreadable(self) -> SkipUnreadable {
    SkipUnreadable {
      inner: self,
      failures: 0,
      exhausted: false,
    }
  }

  fn read_frame(&self, path: &Path, sequence: u64) -> Result<Frame, ImageFileInputError> {
    let image = ImageReader::open(path)?.decode()?.into_rgb8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(
      sequence,
      self.started.elapsed(),
      width,
      height,
      PixelFormat::Rgb8,
      image.into_raw(),
    ))
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor >= self.files.len() {
      if !self.repeat {
        return None;
      }
      self.cursor = 0;
    }
    let path = self.files[self.cursor].clone();
    self.cursor += 1;
    self.sequence += 1;
    Some(self.read_frame(&path, self.sequence))
  }
}

pub struct SkipUnreadable {
  inner: ImageFileInput,
  failures: usize,
  exhausted: bool,
}

impl Iterator for SkipUnreadable {
  type Item = Result<Frame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.exhausted {
      return None;
    }
    loop {
      match self.inner.next()? {
        Ok(frame) => {
          self.failures = 0;
          return Some(Ok(frame));
        }
        Err(e) => {
          warn!("跳过无法读取的图像: {}", e);
          self.failures += 1;
          if self.failures >= self.inner.len() {
            self.exhausted = true;
            return Some(Err(ImageFileInputError::NoReadableImages(self.failures)));
          }
        }
      }
    }
  }
}
