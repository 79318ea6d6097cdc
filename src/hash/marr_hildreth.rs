// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/marr_hildreth.rs - Marr-Hildreth 算子哈希
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

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::equalize_histogram;

use super::util::{hamming, pack_bits, resized_gray};
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::is_empty_image;

const SIZE: usize = 512;
const BLOCK: usize = 16;
const BLOCKS: usize = 31;
const GRID_STEP: usize = 4;

/// 均衡化后的灰度图与墨西哥帽核卷积，再在 31x31 的块和上取 3x3 邻域二值化
#[derive(Debug, Clone, Copy)]
pub struct MarrHildrethHash {
  alpha: f32,
  scale: f32,
}

impl Default for MarrHildrethHash {
  fn default() -> Self {
    Self {
      alpha: 2.0,
      scale: 1.0,
    }
  }
}

impl MarrHildrethHash {
  pub fn new(alpha: f32, scale: f32) -> Self {
    Self { alpha, scale }
  }

  /// 边长 `2 * half + 1` 的核，按行存储
  fn kernel(&self) -> (Vec<f64>, usize) {
    let half = (4.0 * (self.alpha as f64).powf(self.scale as f64)) as i64;
    let half = half.max(1);
    let ratio = (self.alpha as f64).powf(-(self.scale as f64));
    let side = (2 * half + 1) as usize;
    let mut kernel = Vec::with_capacity(side * side);
    for row in -half..=half {
      for col in -half..=half {
        let a = ((row * row + col * col) as f64) * ratio * ratio;
        kernel.push((2.0 - a) * (-a / 2.0).exp());
      }
    }
    (kernel, side)
  }
}

/// reflect-101 边界: -1 -> 1, n -> n - 2
fn reflect(i: i64, n: i64) -> usize {
  if n == 1 {
    return 0;
  }
  let period = 2 * (n - 1);
  let mut i = i.rem_euclid(period);
  if i >= n {
    i = period - i;
  }
  i as usize
}

fn convolve(image: &GrayImage, kernel: &[f64], side: usize) -> Vec<f64> {
  let (w, h) = (image.width() as usize, image.height() as usize);
  let half = side / 2;
  let padded_w = w + 2 * half;
  let padded_h = h + 2 * half;

  let mut padded = Vec::with_capacity(padded_w * padded_h);
  for py in 0..padded_h {
    let sy = reflect(py as i64 - half as i64, h as i64);
    for px in 0..padded_w {
      let sx = reflect(px as i64 - half as i64, w as i64);
      padded.push(image.get_pixel(sx as u32, sy as u32)[0] as f64);
    }
  }

  let mut out = vec![0f64; w * h];
  for y in 0..h {
    for x in 0..w {
      let mut acc = 0.0;
      for ky in 0..side {
        let src = &padded[(y + ky) * padded_w + x..(y + ky) * padded_w + x + side];
        let row = &kernel[ky * side..(ky + 1) * side];
        acc += row.iter().zip(src).map(|(k, v)| k * v).sum::<f64>();
      }
      out[y * w + x] = acc;
    }
  }
  out
}

impl ImgHashBase for MarrHildrethHash {
  fn kind(&self) -> HashKind {
    HashKind::MarrHildrethHash
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let gray = resized_gray(image, SIZE as u32, SIZE as u32, FilterType::CatmullRom);
    let equalized = equalize_histogram(&gray);
    let (kernel, side) = self.kernel();
    let response = convolve(&equalized, &kernel, side);

    let mut blocks = [[0f64; BLOCKS]; BLOCKS];
    for (by, row) in blocks.iter_mut().enumerate() {
      for (bx, cell) in row.iter_mut().enumerate() {
        let mut sum = 0.0;
        for y in by * BLOCK..(by + 1) * BLOCK {
          sum += response[y * SIZE + bx * BLOCK..y * SIZE + (bx + 1) * BLOCK]
            .iter()
            .sum::<f64>();
        }
        *cell = sum;
      }
    }

    let mut bits = Vec::with_capacity(8 * 8 * 9);
    for row in (0..BLOCKS - 2).step_by(GRID_STEP) {
      for col in (0..BLOCKS - 2).step_by(GRID_STEP) {
        let window: Vec<f64> = (row..row + 3)
          .flat_map(|r| blocks[r][col..col + 3].iter().copied())
          .collect();
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        bits.extend(window.iter().map(|&v| v > avg));
      }
    }
    HashResult::new(self.kind(), pack_bits(bits))
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    Ok(hamming(a, b))
  }
}
