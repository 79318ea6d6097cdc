// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/average.rs - 均值哈希
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

use image::DynamicImage;
use image::imageops::FilterType;

use super::util::{hamming, mean, pack_bits, resized_gray};
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::is_empty_image;

#[derive(Debug, Clone, Copy, Default)]
pub struct AverageHash;

impl ImgHashBase for AverageHash {
  fn kind(&self) -> HashKind {
    HashKind::AverageHash
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let gray = resized_gray(image, 8, 8, FilterType::Triangle);
    let pixels: Vec<f64> = gray.pixels().map(|p| p[0] as f64).collect();
    let avg = mean(&pixels);
    HashResult::new(self.kind(), pack_bits(pixels.iter().map(|&v| v > avg)))
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    Ok(hamming(a, b))
  }
}
