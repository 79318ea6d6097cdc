// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/color_moment.rs - 颜色矩哈希
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
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;

use super::util::resized_rgb;
use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::frame::is_empty_image;

const SIZE: u32 = 512;
const BLUR_SIGMA: f32 = 0.8;
const CHANNELS: usize = 6;
const MOMENTS: usize = 7;

/// HSV 与 YCrCb 六个通道各自的 7 个 Hu 矩，共 42 个 f64（小端存储）
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorMomentHash;

impl ImgHashBase for ColorMomentHash {
  fn kind(&self) -> HashKind {
    HashKind::ColorMomentHash
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind());
    }
    let resized = resized_rgb(image, SIZE, SIZE, FilterType::CatmullRom);
    let blurred = gaussian_blur_f32(&resized, BLUR_SIGMA);

    let mut bytes = Vec::with_capacity(CHANNELS * MOMENTS * 8);
    for channel in split_channels(&blurred) {
      for m in hu_moments(&channel) {
        bytes.extend_from_slice(&m.to_le_bytes());
      }
    }
    HashResult::new(self.kind(), bytes)
  }

  /// 两组矩向量的欧氏距离
  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    Ok(
      decode(a)
        .zip(decode(b))
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt(),
    )
  }
}

fn decode(bytes: &[u8]) -> impl Iterator<Item = f64> + '_ {
  bytes.chunks_exact(8).map(|c| {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(c);
    f64::from_le_bytes(raw)
  })
}

/// 返回 H S V Y Cr Cb 六个 8 位通道
fn split_channels(image: &RgbImage) -> Vec<GrayImage> {
  let (w, h) = image.dimensions();
  let mut channels: Vec<GrayImage> = (0..CHANNELS).map(|_| GrayImage::new(w, h)).collect();
  for (x, y, p) in image.enumerate_pixels() {
    let [r, g, b] = p.0;
    let (hh, s, v) = rgb_to_hsv(r, g, b);
    let (yy, cr, cb) = rgb_to_ycrcb(r, g, b);
    for (channel, value) in channels.iter_mut().zip([hh, s, v, yy, cr, cb]) {
      channel.put_pixel(x, y, Luma([value]));
    }
  }
  channels
}

fn saturate(v: f64) -> u8 {
  v.round().clamp(0.0, 255.0) as u8
}

/// 8 位 HSV，色相取 0..180
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
  let (rf, gf, bf) = (r as f64, g as f64, b as f64);
  let v = rf.max(gf).max(bf);
  let min = rf.min(gf).min(bf);
  let diff = v - min;
  let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
  let mut hue = if diff == 0.0 {
    0.0
  } else if v == rf {
    60.0 * (gf - bf) / diff
  } else if v == gf {
    120.0 + 60.0 * (bf - rf) / diff
  } else {
    240.0 + 60.0 * (rf - gf) / diff
  };
  if hue < 0.0 {
    hue += 360.0;
  }
  (saturate(hue / 2.0), saturate(s), saturate(v))
}

fn rgb_to_ycrcb(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
  let (rf, gf, bf) = (r as f64, g as f64, b as f64);
  let y = 0.299 * rf + 0.587 * gf + 0.114 * bf;
  let cr = (rf - y) * 0.713 + 128.0;
  let cb = (bf - y) * 0.564 + 128.0;
  (saturate(y), saturate(cr), saturate(cb))
}

/// 图像的 7 个 Hu 不变矩；零质量的通道返回全 0
fn hu_moments(channel: &GrayImage) -> [f64; MOMENTS] {
  let mut m00 = 0.0;
  let mut m10 = 0.0;
  let mut m01 = 0.0;
  for (x, y, p) in channel.enumerate_pixels() {
    let v = p[0] as f64;
    m00 += v;
    m10 += x as f64 * v;
    m01 += y as f64 * v;
  }
  if m00 == 0.0 {
    return [0.0; MOMENTS];
  }
  let (cx, cy) = (m10 / m00, m01 / m00);

  let (mut mu20, mut mu11, mut mu02) = (0.0, 0.0, 0.0);
  let (mut mu30, mut mu21, mut mu12, mut mu03) = (0.0, 0.0, 0.0, 0.0);
  for (x, y, p) in channel.enumerate_pixels() {
    let v = p[0] as f64;
    let dx = x as f64 - cx;
    let dy = y as f64 - cy;
    mu20 += dx * dx * v;
    mu11 += dx * dy * v;
    mu02 += dy * dy * v;
    mu30 += dx * dx * dx * v;
    mu21 += dx * dx * dy * v;
    mu12 += dx * dy * dy * v;
    mu03 += dy * dy * dy * v;
  }

  let s2 = m00 * m00;
  let s3 = s2 * m00.sqrt();
  let (n20, n11, n02) = (mu20 / s2, mu11 / s2, mu02 / s2);
  let (n30, n21, n12, n03) = (mu30 / s3, mu21 / s3, mu12 / s3, mu03 / s3);

  let t0 = n30 + n12;
  let t1 = n21 + n03;
  let q0 = t0 * t0;
  let q1 = t1 * t1;
  let d = n20 - n02;

  [
    n20 + n02,
    d * d + 4.0 * n11 * n11,
    (n30 - 3.0 * n12).powi(2) + (3.0 * n21 - n03).powi(2),
    q0 + q1,
    (n30 - 3.0 * n12) * t0 * (q0 - 3.0 * q1) + (3.0 * n21 - n03) * t1 * (3.0 * q0 - q1),
    d * (q0 - q1) + 4.0 * n11 * t0 * t1,
    (3.0 * n21 - n03) * t0 * (q0 - 3.0 * q1) - (n30 - 3.0 * n12) * t1 * (3.0 * q0 - q1),
  ]
}
