// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cv.rs - OpenCV 矩阵转换
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

//! `image` 缓冲区与 OpenCV [`Mat`] 之间的转换，只在 `opencv_backend` 下编译。

use image::{GrayImage, RgbImage};
use opencv::core::{Mat, Vec3b};
use opencv::imgproc;
use opencv::prelude::*;

/// 单通道 8 位灰度矩阵，数据被复制一份
pub(crate) fn gray_mat(image: &GrayImage) -> opencv::Result<Mat> {
  Mat::new_rows_cols_with_data::<u8>(image.height() as i32, image.width() as i32, image.as_raw())?
    .try_clone()
}

/// OpenCV 习惯的 BGR 三通道矩阵
pub(crate) fn bgr_mat(image: &RgbImage) -> opencv::Result<Mat> {
  let rgb =
    Mat::new_rows_cols_with_bytes::<Vec3b>(image.height() as i32, image.width() as i32, image.as_raw())?;
  let mut bgr = Mat::default();
  imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
  Ok(bgr)
}

/// 连续矩阵的原始字节
pub(crate) fn mat_bytes(mat: &Mat) -> opencv::Result<Vec<u8>> {
  Ok(mat.data_bytes()?.to_vec())
}
