// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/util.rs - 哈希算法共用的小工具
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

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::frame::rgb_to_gray;

/// 按 LSB 优先每 8 位打包成一个字节
pub(crate) fn pack_bits<I: IntoIterator<Item = bool>>(bits: I) -> Vec<u8> {
  let mut bytes = Vec::new();
  for (i, bit) in bits.into_iter().enumerate() {
    if i % 8 == 0 {
      bytes.push(0u8);
    }
    if bit {
      if let Some(last) = bytes.last_mut() {
        *last |= 1 << (i % 8);
      }
    }
  }
  bytes
}

pub(crate) fn hamming(a: &[u8], b: &[u8]) -> f64 {
  a.iter()
    .zip(b)
    .map(|(x, y)| (x ^ y).count_ones())
    .sum::<u32>() as f64
}

/// 缩放到 `width x height` 后灰度化
pub(crate) fn resized_gray(
  image: &DynamicImage,
  width: u32,
  height: u32,
  filter: FilterType,
) -> GrayImage {
  rgb_to_gray(&resized_rgb(image, width, height, filter))
}

pub(crate) fn resized_rgb(
  image: &DynamicImage,
  width: u32,
  height: u32,
  filter: FilterType,
) -> RgbImage {
  imageops::resize(&image.to_rgb8(), width, height, filter)
}

/// 正交归一化 DCT-II 的第 `k` 个基函数在 `n` 处的值
pub(crate) fn dct_basis(k: usize, n: usize, len: usize) -> f64 {
  let scale = if k == 0 {
    (1.0 / len as f64).sqrt()
  } else {
    (2.0 / len as f64).sqrt()
  };
  scale * (std::f64::consts::PI * (2 * n + 1) as f64 * k as f64 / (2 * len) as f64).cos()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f64>() / values.len() as f64
}
