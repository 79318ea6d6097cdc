// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cascade/opencv_cascade.rs - OpenCV 级联分类器后端
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

use std::path::Path;

use image::GrayImage;
use opencv::core::{Rect, Size, Vector};
use opencv::objdetect;
use opencv::prelude::*;
use tracing::{debug, info};

use super::{CascadeError, DetectParams};
use crate::cv::gray_mat;
use crate::frame::FaceRect;

/// `objdetect::CascadeClassifier` 的封装，检测时需要可变借用
pub struct OpenCvCascade {
  inner: objdetect::CascadeClassifier,
}

fn cv_size(size: Option<(u32, u32)>) -> Size {
  size.map_or(Size::new(0, 0), |(w, h)| Size::new(w as i32, h as i32))
}

impl OpenCvCascade {
  pub fn load(path: &Path) -> Result<Self, CascadeError> {
    // OpenCV 对缺失文件只返回空分类器，先自己检查
    std::fs::metadata(path).map_err(|source| CascadeError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let name = path
      .to_str()
      .ok_or_else(|| CascadeError::Format(format!("路径不是 UTF-8: {}", path.display())))?;

    let inner = objdetect::CascadeClassifier::new(name)?;
    if inner.empty()? {
      return Err(CascadeError::Format(format!(
        "OpenCV 无法解析级联文件 {}",
        path.display()
      )));
    }
    info!("级联分类器已载入 (OpenCV): {}", path.display());
    Ok(Self { inner })
  }

  pub fn detect(
    &mut self,
    gray: &GrayImage,
    params: &DetectParams,
  ) -> Result<Vec<FaceRect>, CascadeError> {
    let mat = gray_mat(gray)?;
    let mut found = Vector::<Rect>::new();
    self.inner.detect_multi_scale(
      &mat,
      &mut found,
      params.scale_factor,
      params.min_neighbors as i32,
      0,
      cv_size(params.min_size),
      cv_size(params.max_size),
    )?;
    debug!("OpenCV 检测到 {} 个框", found.len());
    Ok(
      found
        .iter()
        .map(|r| FaceRect::new(r.x, r.y, r.width, r.height))
        .collect(),
    )
  }
}
