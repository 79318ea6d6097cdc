// 该文件是 Mianxiang （面相） 项目的一部分。
// src/frame.rs - 帧与检测框定义
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

use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  /// 摄像头偶发的空帧
  pub fn empty(index: u64, timestamp_ms: u64) -> Self {
    Self::new(RgbImage::new(0, 0), index, timestamp_ms)
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 人脸检测框，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl FaceRect {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> i64 {
    self.width.max(0) as i64 * self.height.max(0) as i64
  }

  pub fn is_empty(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  /// 与 `width x height` 的图像求交
  pub fn clamp_to(&self, width: u32, height: u32) -> FaceRect {
    let x0 = self.x.clamp(0, width as i32);
    let y0 = self.y.clamp(0, height as i32);
    let x1 = (self.x + self.width).clamp(0, width as i32);
    let y1 = (self.y + self.height).clamp(0, height as i32);
    FaceRect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
  }

  /// 裁剪出检测框内的区域，越界部分被截掉
  pub fn crop(&self, image: &DynamicImage) -> DynamicImage {
    let r = self.clamp_to(image.width(), image.height());
    image.crop_imm(r.x as u32, r.y as u32, r.width as u32, r.height as u32)
  }
}

pub fn is_empty_image(image: &DynamicImage) -> bool {
  image.width() == 0 || image.height() == 0
}

/// BT.601 灰度化，与常见视觉库的 RGB 转灰度权重一致
pub fn to_gray(image: &DynamicImage) -> GrayImage {
  match image {
    DynamicImage::ImageLuma8(gray) => gray.clone(),
    other => rgb_to_gray(&other.to_rgb8()),
  }
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
  let mut gray = GrayImage::new(image.width(), image.height());
  for (x, y, pixel) in image.enumerate_pixels() {
    let [r, g, b] = pixel.0;
    // 定点运算: 0.299 * 2^14, 0.587 * 2^14, 0.114 * 2^14
    let value = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
    gray.put_pixel(x, y, Luma([value.min(255) as u8]));
  }
  gray
}
