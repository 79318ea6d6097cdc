// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/phash.rs - 基于 DCT 的 PHash
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

use super::util::{dct_basis, hamming, mean, pack_bits, resized_gray};
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::is_empty_image;

const SIZE: usize = 32;
const KEEP: usize = 8;

/// 32x32 灰度图做二维 DCT，取左上 8x8 低频系数（去掉直流分量）与均值比较
#[derive(Debug, Clone, Copy, Default)]
pub struct PHash;

impl ImgHashBase for PHash {
  fn kind(&self) -> HashKind {
    HashKind::PHash
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let gray = resized_gray(image, SIZE as u32, SIZE as u32, FilterType::Triangle);

    // 先按列变换，只保留前 KEEP 行
    let mut partial = [[0f64; SIZE]; KEEP];
    for (u, row) in partial.iter_mut().enumerate() {
      for (x, cell) in row.iter_mut().enumerate() {
        *cell = (0..SIZE)
          .map(|y| dct_basis(u, y, SIZE) * gray.get_pixel(x as u32, y as u32)[0] as f64)
          .sum();
      }
    }

    let mut coeffs = Vec::with_capacity(KEEP * KEEP);
    for row in &partial {
      for v in 0..KEEP {
        coeffs.push(
          (0..SIZE)
            .map(|x| row[x] * dct_basis(v, x, SIZE))
            .sum::<f64>(),
        );
      }
    }
    coeffs[0] = 0.0;

    let avg = mean(&coeffs);
    HashResult::new(self.kind(), pack_bits(coeffs.iter().map(|&c| c > avg)))
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
  fn produces_eight_bytes() {
    let hash = PHash.compute(&textured(100, 80, 0));
    assert_eq!(hash.as_bytes().len(), 8);
  }

  #[test]
  fn brightness_shift_keeps_hash_close() {
    let base = image::RgbImage::from_fn(64, 64, |x, y| {
      image::Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) % 50 + 40) as u8])
    });
    let shifted = image::RgbImage::from_fn(64, 64, |x, y| {
      let p = base.get_pixel(x, y).0;
      image::Rgb([p[0] + 5, p[1] + 5, p[2] + 5])
    });
    let a = PHash.compute(&DynamicImage::ImageRgb8(base));
    let b = PHash.compute(&DynamicImage::ImageRgb8(shifted));
    assert!(PHash.compare(&a, &b).unwrap() <= 4.0);
  }

  #[test]
  fn rescaled_image_stays_close() {
    let small = textured(64, 64, 2);
    let large = small.resize_exact(128, 128, FilterType::Triangle);
    let a = PHash.compute(&small);
    let b = PHash.compute(&large);
    assert!(PHash.compare(&a, &b).unwrap() <= 16.0);
  }
}
