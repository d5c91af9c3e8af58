// 该文件是 Qianli （千里眼） 项目的一部分。
// src/codec.rs - 张量编解码
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

mod decode;
mod encode;
pub mod labels;
pub mod palette;

pub use self::decode::{DEFAULT_THRESHOLD, decode};
pub use self::encode::{EncodeError, Encoder, Normalization, ResizeMode};
pub use self::labels::{COCO_CLASSES, LabelMap, UNKNOWN_LABEL};
