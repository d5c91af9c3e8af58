// 该文件是 Qianli （千里眼） 项目的一部分。
// src/codec/palette.rs - 类别显示颜色
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

use std::sync::OnceLock;

use crate::detection::DisplayColor;

const PALETTE_SIZE: usize = 80;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn palette() -> &'static [DisplayColor; PALETTE_SIZE] {
  static PALETTE: OnceLock<[DisplayColor; PALETTE_SIZE]> = OnceLock::new();
  PALETTE.get_or_init(|| {
    // 色相均匀分布的 80 种颜色
    std::array::from_fn(|i| {
      let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
      hsv_to_rgb(hue, 0.8, 0.9)
    })
  })
}

/// 按标签名确定颜色
///
/// 使用 FNV-1a 而不是 `DefaultHasher`，后者的输出在不同 Rust 版本之间不保证稳定。
pub fn color_for(label: &str) -> DisplayColor {
  let hash = label.bytes().fold(FNV_OFFSET, |hash, byte| {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
  });
  palette()[(hash % PALETTE_SIZE as u64) as usize]
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> DisplayColor {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  DisplayColor([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_label_same_color() {
    assert_eq!(color_for("person"), color_for("person"));
    assert_eq!(color_for(""), color_for(""));
  }

  #[test]
  fn hash_is_pinned() {
    // FNV-1a("a") = 0xaf63dc4c8601ec8c
    let expected = palette()[(0xaf63_dc4c_8601_ec8c_u64 % PALETTE_SIZE as u64) as usize];
    assert_eq!(color_for("a"), expected);
  }

  #[test]
  fn first_palette_entry_is_red() {
    assert_eq!(palette()[0], DisplayColor([229, 45, 45]));
  }
}
