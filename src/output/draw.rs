// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::frame::FaceRect;

pub const LABEL: &str = "Human";
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_GAP: i32 = 2;
const LINE_THICKNESS: i32 = 3;
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

/// 蓝色边框加 "Human" 标签
pub struct Draw {
  font: FontArc,
  scale: PxScale,
  color: Rgb<u8>,
}

impl Draw {
  pub fn new() -> Result<Self, InvalidFont> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data)?;
    Ok(Self {
      font,
      scale: PxScale::from(LABEL_FONT_SIZE),
      color: BLUE,
    })
  }

  /// 标签左上角：水平居中于框，位于框上方
  pub fn label_position(&self, rect: &FaceRect) -> (i32, i32) {
    let (text_w, text_h) = text_size(self.scale, &self.font, LABEL);
    let x = rect.x + rect.width / 2 - text_w as i32 / 2;
    let y = rect.y - text_h as i32 - LABEL_GAP;
    (x, y.max(0))
  }

  pub fn draw_faces(&self, image: &mut RgbImage, faces: &[FaceRect]) {
    for face in faces {
      let r = face.clamp_to(image.width(), image.height());
      if r.is_empty() {
        continue;
      }
      // 向内逐像素加粗
      for t in 0..LINE_THICKNESS {
        let (w, h) = (r.width - 2 * t, r.height - 2 * t);
        if w <= 0 || h <= 0 {
          break;
        }
        draw_hollow_rect_mut(
          image,
          Rect::at(r.x + t, r.y + t).of_size(w as u32, h as u32),
          self.color,
        );
      }

      let (x, y) = self.label_position(face);
      draw_text_mut(image, self.color, x, y, self.scale, &self.font, LABEL);
    }
  }

  /// 复制一份并画上全部检测框
  pub fn annotate(&self, image: &DynamicImage, faces: &[FaceRect]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    self.draw_faces(&mut canvas, faces);
    canvas
  }
}
