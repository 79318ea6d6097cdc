// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cascade/integral.rs - 积分图
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

use image::GrayImage;

/// 和、平方和以及可选的 45° 旋转积分图
///
/// 所有表都是 `(width + 1) x (height + 1)`，第 0 行与第 0 列为 0。
pub(crate) struct IntegralImages {
  stride: usize,
  sum: Vec<i64>,
  sq_sum: Vec<i64>,
  tilted: Option<TiltedTable>,
}

/// `T[Y][X]` 为顶点在 `(X - 1, Y - 1)` 向上展开的三角形内像素和。
/// 列方向左右各留 `margin` 列，旋转矩形的角点可以落在图像外。
struct TiltedTable {
  stride: usize,
  x_min: i64,
  rows: usize,
  data: Vec<i64>,
}

impl IntegralImages {
  pub fn new(gray: &GrayImage, with_tilted: bool) -> Self {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let stride = width + 1;
    let mut sum = vec![0i64; stride * (height + 1)];
    let mut sq_sum = vec![0i64; stride * (height + 1)];

    for y in 0..height {
      let mut row_sum = 0i64;
      let mut row_sq = 0i64;
      for x in 0..width {
        let v = gray.get_pixel(x as u32, y as u32)[0] as i64;
        row_sum += v;
        row_sq += v * v;
        let idx = (y + 1) * stride + x + 1;
        sum[idx] = sum[idx - stride] + row_sum;
        sq_sum[idx] = sq_sum[idx - stride] + row_sq;
      }
    }

    let tilted = with_tilted.then(|| TiltedTable::new(gray));
    Self {
      stride,
      sum,
      sq_sum,
      tilted,
    }
  }

  fn rect(table: &[i64], stride: usize, x: i32, y: i32, w: i32, h: i32) -> i64 {
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = ((x + w) as usize, (y + h) as usize);
    table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
      + table[y0 * stride + x0]
  }

  /// 轴对齐矩形内的像素和，调用方保证矩形在图像内
  pub fn sum(&self, x: i32, y: i32, w: i32, h: i32) -> i64 {
    Self::rect(&self.sum, self.stride, x, y, w, h)
  }

  pub fn sq_sum(&self, x: i32, y: i32, w: i32, h: i32) -> i64 {
    Self::rect(&self.sq_sum, self.stride, x, y, w, h)
  }

  /// 45° 旋转矩形，`(x, y)` 为上顶点，`w` 沿右下方向，`h` 沿左下方向
  pub fn tilted_sum(&self, x: i32, y: i32, w: i32, h: i32) -> i64 {
    match &self.tilted {
      Some(t) => {
        let (x, y, w, h) = (x as i64, y as i64, w as i64, h as i64);
        t.at(x, y) - t.at(x - h, y + h) - t.at(x + w, y + w) + t.at(x + w - h, y + w + h)
      }
      None => 0,
    }
  }
}

impl TiltedTable {
  fn new(gray: &GrayImage) -> Self {
    let (width, height) = (gray.width() as i64, gray.height() as i64);
    // 查询最多越出图像 height 列，递推误差每行向内传播一列，再留 height 列
    let margin = 2 * height + 2;
    let x_min = -margin;
    let stride = (width + 2 * margin + 1) as usize;
    let rows = (height + 1) as usize;
    let mut data = vec![0i64; stride * rows];

    let pixel = |x: i64, y: i64| -> i64 {
      if x >= 0 && y >= 0 && x < width && y < height {
        gray.get_pixel(x as u32, y as u32)[0] as i64
      } else {
        0
      }
    };

    for row in 1..rows {
      let b = row as i64 - 1;
      for col in 0..stride {
        let a = x_min + col as i64 - 1;
        let up_left = if col >= 1 {
          data[(row - 1) * stride + col - 1]
        } else {
          0
        };
        let up_right = if col + 1 < stride {
          data[(row - 1) * stride + col + 1]
        } else {
          0
        };
        let up_two = if row >= 2 {
          data[(row - 2) * stride + col]
        } else {
          0
        };
        data[row * stride + col] = up_left + up_right - up_two + pixel(a, b) + pixel(a, b - 1);
      }
    }

    Self {
      stride,
      x_min,
      rows,
      data,
    }
  }

  /// `T[y][x]`，越界的行列按最近的边界取值
  fn at(&self, x: i64, y: i64) -> i64 {
    let row = y.clamp(0, self.rows as i64 - 1) as usize;
    let col = (x - self.x_min).clamp(0, self.stride as i64 - 1) as usize;
    self.data[row * self.stride + col]
  }
}
