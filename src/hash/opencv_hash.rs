// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash/opencv_hash.rs - OpenCV img_hash 后端
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

//! # OpenCV img_hash 后端
//!
//! 七种哈希都交给 `opencv::img_hash`。参数取 OpenCV 的默认值，
//! 与原生实现一致：MarrHildreth `alpha = 2, scale = 1`，RadialVariance `sigma = 1, 180` 条角度线。
//! ColorMomentHash 输出 42 个 `f64`，其余输出 `u8` 序列。

use image::DynamicImage;
use opencv::boxed_ref::BoxedRef;
use opencv::core::Mat;
use opencv::img_hash;
use opencv::prelude::*;
use tracing::warn;

use super::{HashError, HashKind, HashResult, ImgHashBase};
use crate::cv::{bgr_mat, mat_bytes};
use crate::frame::is_empty_image;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenCvHash {
  kind: HashKind,
}

impl OpenCvHash {
  pub fn new(kind: HashKind) -> Self {
    Self { kind }
  }

  fn hash_bytes(&self, image: &DynamicImage) -> opencv::Result<Vec<u8>> {
    let input = bgr_mat(&image.to_rgb8())?;
    let mut out = Mat::default();
    match self.kind {
      HashKind::PHash => img_hash::p_hash(&input, &mut out)?,
      HashKind::AverageHash => img_hash::average_hash(&input, &mut out)?,
      HashKind::BlockMeanHash0 => {
        img_hash::block_mean_hash(&input, &mut out, img_hash::BLOCK_MEAN_HASH_MODE_0)?
      }
      HashKind::BlockMeanHash1 => {
        img_hash::block_mean_hash(&input, &mut out, img_hash::BLOCK_MEAN_HASH_MODE_1)?
      }
      HashKind::ColorMomentHash => img_hash::color_moment_hash(&input, &mut out)?,
      HashKind::MarrHildrethHash => img_hash::marr_hildreth_hash_def(&input, &mut out)?,
      HashKind::RadialVarianceHash => img_hash::radial_variance_hash_def(&input, &mut out)?,
    }
    mat_bytes(&out)
  }

  fn hash_mat<'a>(&self, bytes: &'a [u8]) -> opencv::Result<BoxedRef<'a, Mat>> {
    match self.kind {
      HashKind::ColorMomentHash => Mat::from_bytes::<f64>(bytes),
      _ => Mat::from_slice(bytes),
    }
  }

  fn compare_bytes(&self, a: &[u8], b: &[u8]) -> opencv::Result<f64> {
    let (a, b) = (self.hash_mat(a)?, self.hash_mat(b)?);
    match self.kind {
      HashKind::PHash => img_hash::PHash::create()?.compare(&a, &b),
      HashKind::AverageHash => img_hash::AverageHash::create()?.compare(&a, &b),
      HashKind::BlockMeanHash0 => {
        img_hash::BlockMeanHash::create(img_hash::BLOCK_MEAN_HASH_MODE_0)?.compare(&a, &b)
      }
      HashKind::BlockMeanHash1 => {
        img_hash::BlockMeanHash::create(img_hash::BLOCK_MEAN_HASH_MODE_1)?.compare(&a, &b)
      }
      HashKind::ColorMomentHash => img_hash::ColorMomentHash::create()?.compare(&a, &b),
      HashKind::MarrHildrethHash => img_hash::MarrHildrethHash::create_def()?.compare(&a, &b),
      HashKind::RadialVarianceHash => {
        img_hash::RadialVarianceHash::create_def()?.compare(&a, &b)
      }
    }
  }
}

impl ImgHashBase for OpenCvHash {
  fn kind(&self) -> HashKind {
    self.kind
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    if is_empty_image(image) {
      return HashResult::empty(self.kind);
    }
    match self.hash_bytes(image) {
      Ok(bytes) => HashResult::new(self.kind, bytes),
      Err(e) => {
        warn!("OpenCV 计算 {} 失败: {}", self.kind, e);
        HashResult::empty(self.kind)
      }
    }
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    self
      .compare_bytes(a, b)
      .map_err(|e| HashError::Backend(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hash::tests::{empty_image, textured};

  #[test]
  fn output_lengths_match_native_layout() {
    let image = textured(64, 48, 2);
    let expected = [
      (HashKind::PHash, 8),
      (HashKind::AverageHash, 8),
      (HashKind::BlockMeanHash0, 32),
      (HashKind::BlockMeanHash1, 121),
      (HashKind::ColorMomentHash, 42 * 8),
      (HashKind::MarrHildrethHash, 72),
      (HashKind::RadialVarianceHash, 40),
    ];
    for (kind, len) in expected {
      let r = OpenCvHash::new(kind).compute(&image);
      assert_eq!(r.as_bytes().len(), len, "{}", kind);
    }
  }

  #[test]
  fn self_comparison_gives_sentinels() {
    let image = textured(64, 48, 3);
    for kind in [HashKind::PHash, HashKind::ColorMomentHash, HashKind::RadialVarianceHash] {
      let h = OpenCvHash::new(kind);
      let a = h.compute(&image);
      let score = h.compare(&a, &a.clone()).unwrap();
      let expected = if kind == HashKind::RadialVarianceHash { 1.0 } else { 0.0 };
      assert!((score - expected).abs() < 1e-9, "{}: {}", kind, score);
    }
  }

  #[test]
  fn empty_image_gives_empty_result() {
    assert!(OpenCvHash::new(HashKind::AverageHash).compute(&empty_image()).is_empty());
  }
}
