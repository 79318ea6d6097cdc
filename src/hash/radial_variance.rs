// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/radial_variance.rs - 径向方差哈希
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

use image::{DynamicImage, GrayImage};
use imageproc::filter::gaussian_blur_f32;

use super::util::dct_basis;
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::{is_empty_image, to_gray};

const COEFFICIENTS: usize = 40;

/// 过图像中心的若干条直线上的像素方差，取 DCT 前 40 个系数量化到 0..255。
/// 比较结果为循环平移下的最大归一化互相关，越接近 1 越相似。
#[derive(Debug, Clone, Copy)]
pub struct RadialVarianceHash {
  sigma: f32,
  angles: usize,
}

impl Default for RadialVarianceHash {
  fn default() -> Self {
    Self {
      sigma: 1.0,
      angles: 180,
    }
  }
}

impl RadialVarianceHash {
  pub fn new(sigma: f32, angles: usize) -> Self {
    Self {
      sigma,
      angles: angles.max(1),
    }
  }

  /// 每个角度一条线，返回线上像素的方差
  fn radial_features(&self, gray: &GrayImage) -> Vec<f64> {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let diameter = w.max(h);
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);

    (0..self.angles)
      .map(|k| {
        let theta = std::f64::consts::PI * k as f64 / self.angles as f64;
        let (sin, cos) = theta.sin_cos();
        let (mut sum, mut sq_sum, mut count) = (0.0, 0.0, 0usize);
        for t in -diameter / 2..diameter / 2 {
          let x = (cx + t as f64 * cos).round() as i64;
          let y = (cy + t as f64 * sin).round() as i64;
          if x < 0 || y < 0 || x >= w || y >= h {
            continue;
          }
          let v = gray.get_pixel(x as u32, y as u32)[0] as f64;
          sum += v;
          sq_sum += v * v;
          count += 1;
        }
        if count == 0 {
          return 0.0;
        }
        let mean = sum / count as f64;
        sq_sum / count as f64 - mean * mean
      })
      .collect()
  }
}

fn dct_coefficients(features: &[f64]) -> Vec<f64> {
  let n = features.len();
  (0..COEFFICIENTS)
    .map(|k| {
      features
        .iter()
        .enumerate()
        .map(|(i, f)| f * dct_basis(k, i, n))
        .sum()
    })
    .collect()
}

fn quantize(coeffs: &[f64]) -> Vec<u8> {
  let min = coeffs.iter().copied().fold(f64::INFINITY, f64::min);
  let max = coeffs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let range = max - min;
  if range <= 0.0 {
    return vec![0; coeffs.len()];
  }
  coeffs
    .iter()
    .map(|c| ((c - min) * 255.0 / range).round().clamp(0.0, 255.0) as u8)
    .collect()
}

impl ImgHashBase for RadialVarianceHash {
  fn kind(&self) -> HashKind {
    HashKind::RadialVarianceHash
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let gray = to_gray(image);
    let blurred = if self.sigma > 0.0 {
      gaussian_blur_f32(&gray, self.sigma)
    } else {
      gray
    };
    let features = self.radial_features(&blurred);
    HashResult::new(self.kind(), quantize(&dct_coefficients(&features)))
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    Ok(peak_correlation(a, b))
  }
}

/// 归一化循环互相关的最大值
fn peak_correlation(a: &[u8], b: &[u8]) -> f64 {
  let n = a.len();
  if n == 0 {
    return 0.0;
  }
  let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
  let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
  let da: Vec<f64> = a.iter().map(|&v| v as f64 - mean_a).collect();
  let db: Vec<f64> = b.iter().map(|&v| v as f64 - mean_b).collect();
  let norm = (da.iter().map(|v| v * v).sum::<f64>() * db.iter().map(|v| v * v).sum::<f64>()).sqrt();
  if norm == 0.0 {
    return if a == b { 1.0 } else { 0.0 };
  }

  (0..n)
    .map(|shift| {
      da.iter()
        .enumerate()
        .map(|(i, x)| x * db[(i + shift) % n])
        .sum::<f64>()
        / norm
    })
    .fold(f64::NEG_INFINITY, f64::max)
}
