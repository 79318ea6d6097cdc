// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/block_mean.rs - 分块均值哈希
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

use super::util::{hamming, pack_bits, resized_gray};
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::is_empty_image;

const IMAGE_SIZE: u32 = 256;
const BLOCK: u32 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockMeanMode {
  /// 不重叠的块，步长 16
  #[default]
  Mode0,
  /// 半重叠的块，步长 8
  Mode1,
}

impl BlockMeanMode {
  fn step(&self) -> u32 {
    match self {
      BlockMeanMode::Mode0 => BLOCK,
      BlockMeanMode::Mode1 => BLOCK / 2,
    }
  }
}

/// 256x256 灰度图上 16x16 块的均值与中位数比较
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMeanHash {
  mode: BlockMeanMode,
}

impl BlockMeanHash {
  pub fn new(mode: BlockMeanMode) -> Self {
    Self { mode }
  }

  pub fn mode(&self) -> BlockMeanMode {
    self.mode
  }
}

impl ImgHashBase for BlockMeanHash {
  fn kind(&self) -> HashKind {
    match self.mode {
      BlockMeanMode::Mode0 => HashKind::BlockMeanHash0,
      BlockMeanMode::Mode1 => HashKind::BlockMeanHash1,
    }
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let gray = resized_gray(image, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);
    let step = self.mode.step() as usize;
    let area = (BLOCK * BLOCK) as f64;

    let mut means = Vec::new();
    for by in (0..=(IMAGE_SIZE - BLOCK)).step_by(step) {
      for bx in (0..=(IMAGE_SIZE - BLOCK)).step_by(step) {
        let mut sum = 0u32;
        for y in by..by + BLOCK {
          for x in bx..bx + BLOCK {
            sum += gray.get_pixel(x, y)[0] as u32;
          }
        }
        means.push(sum as f64 / area);
      }
    }

    let mut sorted = means.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];

    HashResult::new(self.kind(), pack_bits(means.iter().map(|&m| m >= median)))
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    Ok(hamming(a, b))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hash::tests::textured;

  #[test]
  fn sizes_per_mode() {
    let image = textured(90, 70, 0);
    let m0 = BlockMeanHash::new(BlockMeanMode::Mode0).compute(&image);
    let m1 = BlockMeanHash::new(BlockMeanMode::Mode1).compute(&image);
    assert_eq!(m0.as_bytes().len(), 32);
    // 31 x 31 = 961 位
    assert_eq!(m1.as_bytes().len(), 121);
    assert_eq!(m0.kind(), HashKind::BlockMeanHash0);
    assert_eq!(m1.kind(), HashKind::BlockMeanHash1);
  }

  #[test]
  fn flat_image_sets_every_bit() {
    // 所有块都等于中位数
    let image = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(64, 64, image::Luma([50])));
    let hash = BlockMeanHash::default().compute(&image);
    assert!(hash.as_bytes().iter().all(|&b| b == 0xff));
  }

  #[test]
  fn modes_are_not_comparable() {
    let image = textured(40, 40, 0);
    let m0 = BlockMeanHash::new(BlockMeanMode::Mode0);
    let m1 = BlockMeanHash::new(BlockMeanMode::Mode1);
    assert!(m0.compare(&m0.compute(&image), &m1.compute(&image)).is_err());
  }
}
