// 该文件是 Mianxiang （面相） 项目的一部分。
// src/hash.rs - 感知哈希算法
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

//! # 感知哈希
//!
//! 每个算法把一张图压成一段字节（[`HashResult`]），同一算法算出的两段字节可以比较，
//! 得到的分数含义因算法而异：
//!
//! | 算法 | 比较方式 | 完全相同时 |
//! |------|----------|------------|
//! | PHash / AverageHash / BlockMeanHash / MarrHildrethHash | 汉明距离 | 0 |
//! | ColorMomentHash | L2 距离 | 0 |
//! | RadialVarianceHash | 峰值互相关 | 1 |
//!
//! 空图像得到空结果，调用方据此判断计算失败。
//!
//! 启用 `opencv_backend` 时由 OpenCV 的 `img_hash` 模块计算，否则使用 `image` / `imageproc` 上的原生实现。

mod average;
mod block_mean;
mod color_moment;
mod marr_hildreth;
#[cfg(feature = "opencv_backend")]
mod opencv_hash;
mod phash;
mod radial_variance;
mod util;

use std::fmt;

use image::DynamicImage;
use thiserror::Error;
use tracing::debug;

use crate::config::HashFlags;

pub use self::average::AverageHash;
pub use self::block_mean::{BlockMeanHash, BlockMeanMode};
pub use self::color_moment::ColorMomentHash;
pub use self::marr_hildreth::MarrHildrethHash;
#[cfg(feature = "opencv_backend")]
pub use self::opencv_hash::OpenCvHash;
pub use self::phash::PHash;
pub use self::radial_variance::RadialVarianceHash;

#[derive(Error, Debug, PartialEq)]
pub enum HashError {
  #[error("哈希类型不一致: {left} 与 {right}")]
  KindMismatch { left: HashKind, right: HashKind },
  #[error("哈希长度不一致: {left} 与 {right} 字节")]
  LengthMismatch { left: usize, right: usize },
  #[error("{0} 哈希为空")]
  Empty(HashKind),
  #[error("哈希后端错误: {0}")]
  Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
  PHash,
  AverageHash,
  BlockMeanHash0,
  BlockMeanHash1,
  ColorMomentHash,
  MarrHildrethHash,
  RadialVarianceHash,
}

impl HashKind {
  /// 输出中使用的算法名，两种 BlockMean 模式同名
  pub fn name(&self) -> &'static str {
    match self {
      HashKind::PHash => "PHash",
      HashKind::AverageHash => "AverageHash",
      HashKind::BlockMeanHash0 | HashKind::BlockMeanHash1 => "BlockMeanHash",
      HashKind::ColorMomentHash => "ColorMomentHash",
      HashKind::MarrHildrethHash => "MarrHildrethHash",
      HashKind::RadialVarianceHash => "RadialVarianceHash",
    }
  }
}

impl fmt::Display for HashKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HashKind::BlockMeanHash0 => write!(f, "BlockMeanHash(mode 0)"),
      HashKind::BlockMeanHash1 => write!(f, "BlockMeanHash(mode 1)"),
      other => write!(f, "{}", other.name()),
    }
  }
}

/// 算法输出，带上产生它的算法
#[derive(Debug, Clone, PartialEq)]
pub struct HashResult {
  kind: HashKind,
  bytes: Vec<u8>,
}

impl HashResult {
  pub fn new(kind: HashKind, bytes: Vec<u8>) -> Self {
    Self { kind, bytes }
  }

  pub fn empty(kind: HashKind) -> Self {
    Self::new(kind, Vec::new())
  }

  pub fn kind(&self) -> HashKind {
    self.kind
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// 小写十六进制
  pub fn to_hex(&self) -> String {
    self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
  }
}

pub trait ImgHashBase {
  fn kind(&self) -> HashKind;

  fn name(&self) -> &'static str {
    self.kind().name()
  }

  /// 空图像返回空结果
  fn compute(&self, image: &DynamicImage) -> HashResult;

  /// 两段同长度哈希字节之间的分数
  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError>;

  fn compare(&self, a: &HashResult, b: &HashResult) -> Result<f64, HashError> {
    let kind = self.kind();
    for r in [a, b] {
      if r.kind != kind {
        return Err(HashError::KindMismatch {
          left: kind,
          right: r.kind,
        });
      }
      if r.is_empty() {
        return Err(HashError::Empty(kind));
      }
    }
    if a.bytes.len() != b.bytes.len() {
      return Err(HashError::LengthMismatch {
        left: a.bytes.len(),
        right: b.bytes.len(),
      });
    }
    self.score(&a.bytes, &b.bytes)
  }
}

/// 全部算法的统一入口
#[derive(Debug, Clone)]
pub enum HashAlgorithm {
  PHash(PHash),
  Average(AverageHash),
  BlockMean(BlockMeanHash),
  ColorMoment(ColorMomentHash),
  MarrHildreth(MarrHildrethHash),
  RadialVariance(RadialVarianceHash),
  #[cfg(feature = "opencv_backend")]
  OpenCv(OpenCvHash),
}

impl HashAlgorithm {
  fn inner(&self) -> &dyn ImgHashBase {
    match self {
      HashAlgorithm::PHash(h) => h,
      HashAlgorithm::Average(h) => h,
      HashAlgorithm::BlockMean(h) => h,
      HashAlgorithm::ColorMoment(h) => h,
      HashAlgorithm::MarrHildreth(h) => h,
      HashAlgorithm::RadialVariance(h) => h,
      #[cfg(feature = "opencv_backend")]
      HashAlgorithm::OpenCv(h) => h,
    }
  }

  /// 原生实现
  pub fn native(kind: HashKind) -> Self {
    match kind {
      HashKind::PHash => HashAlgorithm::PHash(PHash),
      HashKind::AverageHash => HashAlgorithm::Average(AverageHash),
      HashKind::BlockMeanHash0 => HashAlgorithm::BlockMean(BlockMeanHash::new(BlockMeanMode::Mode0)),
      HashKind::BlockMeanHash1 => HashAlgorithm::BlockMean(BlockMeanHash::new(BlockMeanMode::Mode1)),
      HashKind::ColorMomentHash => HashAlgorithm::ColorMoment(ColorMomentHash),
      HashKind::MarrHildrethHash => HashAlgorithm::MarrHildreth(MarrHildrethHash::default()),
      HashKind::RadialVarianceHash => HashAlgorithm::RadialVariance(RadialVarianceHash::default()),
    }
  }

  /// 编译进来的首选后端
  #[cfg(feature = "opencv_backend")]
  pub fn for_kind(kind: HashKind) -> Self {
    HashAlgorithm::OpenCv(OpenCvHash::new(kind))
  }

  /// 编译进来的首选后端
  #[cfg(not(feature = "opencv_backend"))]
  pub fn for_kind(kind: HashKind) -> Self {
    Self::native(kind)
  }
}

impl ImgHashBase for HashAlgorithm {
  fn kind(&self) -> HashKind {
    self.inner().kind()
  }

  fn compute(&self, image: &DynamicImage) -> HashResult {
    self.inner().compute(image)
  }

  fn score(&self, a: &[u8], b: &[u8]) -> Result<f64, HashError> {
    self.inner().score(a, b)
  }
}

/// 按固定顺序返回选中的算法；什么都没选时等同于 `--all`
pub fn setup_hashes(flags: &HashFlags) -> Vec<HashAlgorithm> {
  let all = flags.all;
  let selected = [
    (flags.phash, HashKind::PHash),
    (flags.average, HashKind::AverageHash),
    (flags.blockmean0, HashKind::BlockMeanHash0),
    (flags.blockmean1, HashKind::BlockMeanHash1),
    (flags.colormoment, HashKind::ColorMomentHash),
    (flags.marrhildreth, HashKind::MarrHildrethHash),
    (flags.radialvariance, HashKind::RadialVarianceHash),
  ];
  let hashes: Vec<HashAlgorithm> = selected
    .into_iter()
    .filter(|(on, _)| *on || all)
    .map(|(_, kind)| HashAlgorithm::for_kind(kind))
    .collect();

  if hashes.is_empty() {
    debug!("未选择任何哈希算法，使用全部算法");
    return setup_hashes(&flags.with_all());
  }
  hashes
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  /// 带渐变和几块色斑的测试图
  pub(crate) fn textured(width: u32, height: u32, seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
      let r = ((x * 255) / width.max(1)) as u8;
      let g = ((y * 255) / height.max(1)) as u8;
      let b = if ((x / 7 + y / 5 + seed) % 3) == 0 { 220 } else { 30 };
      Rgb([r, g, b])
    }))
  }

  pub(crate) fn empty_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(0, 0))
  }

  fn kinds(hashes: &[HashAlgorithm]) -> Vec<HashKind> {
    hashes.iter().map(|h| h.kind()).collect()
  }

  const ALL_KINDS: [HashKind; 7] = [
    HashKind::PHash,
    HashKind::AverageHash,
    HashKind::BlockMeanHash0,
    HashKind::BlockMeanHash1,
    HashKind::ColorMomentHash,
    HashKind::MarrHildrethHash,
    HashKind::RadialVarianceHash,
  ];

  #[test]
  fn no_flags_selects_everything() {
    assert_eq!(kinds(&setup_hashes(&HashFlags::default())), ALL_KINDS);
  }

  #[test]
  fn all_flag_equals_every_individual_flag() {
    let every = HashFlags {
      phash: true,
      average: true,
      blockmean0: true,
      blockmean1: true,
      colormoment: true,
      marrhildreth: true,
      radialvariance: true,
      ..HashFlags::default()
    };
    assert_eq!(
      kinds(&setup_hashes(&HashFlags::all())),
      kinds(&setup_hashes(&every))
    );
  }

  #[test]
  fn selection_is_never_empty_and_ordered() {
    // 7 个开关的全部组合
    for mask in 0u32..128 {
      let flags = HashFlags {
        phash: mask & 1 != 0,
        average: mask & 2 != 0,
        blockmean0: mask & 4 != 0,
        blockmean1: mask & 8 != 0,
        colormoment: mask & 16 != 0,
        marrhildreth: mask & 32 != 0,
        radialvariance: mask & 64 != 0,
        all: false,
      };
      let selected = kinds(&setup_hashes(&flags));
      assert!(!selected.is_empty());
      let expected: Vec<HashKind> = if mask == 0 {
        ALL_KINDS.to_vec()
      } else {
        ALL_KINDS
          .iter()
          .enumerate()
          .filter(|(i, _)| mask & (1 << i) != 0)
          .map(|(_, k)| *k)
          .collect()
      };
      assert_eq!(selected, expected, "mask {:07b}", mask);
    }
  }

  #[test]
  fn single_flag_selects_one() {
    let flags = HashFlags {
      colormoment: true,
      ..HashFlags::default()
    };
    assert_eq!(
      kinds(&setup_hashes(&flags)),
      vec![HashKind::ColorMomentHash]
    );
  }

  #[test]
  fn every_algorithm_is_deterministic_with_sentinel_self_score() {
    let image = textured(64, 48, 1);
    for hash in setup_hashes(&HashFlags::all()) {
      let a = hash.compute(&image);
      let b = hash.compute(&image);
      assert!(!a.is_empty(), "{}", hash.kind());
      assert_eq!(a, b, "{}", hash.kind());
      let expected = match hash.kind() {
        HashKind::RadialVarianceHash => 1.0,
        _ => 0.0,
      };
      let score = hash.compare(&a, &b).unwrap();
      assert!((score - expected).abs() < 1e-9, "{}: {}", hash.kind(), score);
    }
  }

  #[test]
  fn every_algorithm_returns_empty_for_empty_image() {
    for hash in setup_hashes(&HashFlags::all()) {
      assert!(hash.compute(&empty_image()).is_empty(), "{}", hash.kind());
    }
  }

  #[test]
  fn mismatched_kinds_are_rejected() {
    let image = textured(32, 32, 0);
    let p = HashAlgorithm::PHash(PHash);
    let a = AverageHash.compute(&image);
    let b = p.compute(&image);
    assert_eq!(
      p.compare(&a, &b),
      Err(HashError::KindMismatch {
        left: HashKind::PHash,
        right: HashKind::AverageHash
      })
    );
  }

  #[test]
  fn empty_result_cannot_be_compared() {
    let p = PHash;
    let a = p.compute(&textured(16, 16, 0));
    let empty = HashResult::empty(HashKind::PHash);
    assert_eq!(p.compare(&a, &empty), Err(HashError::Empty(HashKind::PHash)));
  }

  #[test]
  fn native_constructor_covers_every_kind() {
    for kind in ALL_KINDS {
      assert_eq!(HashAlgorithm::native(kind).kind(), kind);
      assert_eq!(HashAlgorithm::for_kind(kind).kind(), kind);
    }
  }

  #[cfg(feature = "opencv_backend")]
  #[test]
  fn opencv_backend_is_preferred() {
    assert!(
      setup_hashes(&HashFlags::all())
        .iter()
        .all(|h| matches!(h, HashAlgorithm::OpenCv(_)))
    );
  }

  #[test]
  fn hex_is_lowercase_two_digits() {
    let r = HashResult::new(HashKind::PHash, vec![0x0a, 0xff, 0x00]);
    assert_eq!(r.to_hex(), "0aff00");
  }

  #[test]
  fn names_match_output_labels() {
    assert_eq!(HashKind::BlockMeanHash1.name(), "BlockMeanHash");
    assert_eq!(HashKind::RadialVarianceHash.name(), "RadialVarianceHash");
  }
}
