// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cascade.rs - 级联分类器人脸检测
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

//! # 级联分类器
//!
//! 读取 OpenCV 格式（`<opencv_storage><cascade>`）的 Boost 级联 XML，
//! 支持 HAAR 与 LBP 两种特征，以图像金字塔加滑动窗口的方式做多尺度检测，
//! 最后对候选框做聚类合并。
//!
//! 启用 `opencv_backend` 时 [`CascadeClassifier::load`] 改用 OpenCV 的 `objdetect` 模块，
//! [`NativeCascade`] 仍可单独使用。
//!
//! ```no_run
//! use mianxiang::cascade::{CascadeClassifier, DetectParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut classifier = CascadeClassifier::load("haarcascade_frontalface_default.xml")?;
//! let image = image::open("face.jpg")?.to_luma8();
//! let faces = classifier.detect_multi_scale(&image, &DetectParams::default())?;
//! println!("found {} faces", faces.len());
//! # Ok(())
//! # }
//! ```

mod group;
mod integral;
#[cfg(feature = "opencv_backend")]
mod opencv_cascade;
mod xml;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{FaceRect, is_empty_image, to_gray};

pub use self::group::group_rectangles;
use self::integral::IntegralImages;
#[cfg(feature = "opencv_backend")]
pub use self::opencv_cascade::OpenCvCascade;

/// 候选框聚类的相似度阈值
pub const GROUP_EPS: f64 = 0.2;

#[derive(Error, Debug)]
pub enum CascadeError {
  #[error("无法读取级联文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("XML 解析错误: {0}")]
  Xml(#[from] roxmltree::Error),
  #[error("级联文件格式错误: {0}")]
  Format(String),
  #[error("不支持的级联类型: {0}")]
  Unsupported(String),
  #[error("缩放系数必须大于 1, 实际为 {0}")]
  InvalidScaleFactor(f64),
  #[cfg(feature = "opencv_backend")]
  #[error("OpenCV 错误: {0}")]
  OpenCv(#[from] opencv::Error),
}

/// 多尺度检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
  pub scale_factor: f64,
  pub min_neighbors: u32,
  pub min_size: Option<(u32, u32)>,
  pub max_size: Option<(u32, u32)>,
}

impl Default for DetectParams {
  fn default() -> Self {
    Self {
      scale_factor: 1.1,
      min_neighbors: 3,
      min_size: None,
      max_size: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
  Haar,
  Lbp,
}

#[derive(Debug, Clone)]
pub(crate) struct Stage {
  pub threshold: f32,
  pub weak: Vec<WeakClassifier>,
}

#[derive(Debug, Clone)]
pub(crate) struct WeakClassifier {
  pub nodes: Vec<DecisionNode>,
  pub leaves: Vec<f32>,
}

/// `left`/`right` 大于 0 指向同一弱分类器内的节点，小于等于 0 时 `-idx` 为叶子下标
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecisionNode {
  pub left: i32,
  pub right: i32,
  pub feature: usize,
  pub split: Split,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Split {
  Threshold(f32),
  Subset([u32; 8]),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WeightedRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
  pub weight: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct HaarFeature {
  pub rects: Vec<WeightedRect>,
  pub tilted: bool,
}

/// 3x3 网格，每格 `width x height`
#[derive(Debug, Clone, Copy)]
pub(crate) struct LbpFeature {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

#[derive(Debug, Clone)]
pub(crate) enum Features {
  Haar(Vec<HaarFeature>),
  Lbp(Vec<LbpFeature>),
}

/// 级联分类器，按编译特性选择后端
pub enum CascadeClassifier {
  Native(NativeCascade),
  #[cfg(feature = "opencv_backend")]
  OpenCv(OpenCvCascade),
}

impl CascadeClassifier {
  /// 从 XML 文件载入，有 OpenCV 时优先使用
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CascadeError> {
    load_backend(path.as_ref())
  }

  /// 从 XML 文本构造原生分类器
  pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
    Ok(CascadeClassifier::Native(NativeCascade::from_xml(text)?))
  }

  /// 在灰度图上做多尺度检测
  pub fn detect_multi_scale(
    &mut self,
    gray: &GrayImage,
    params: &DetectParams,
  ) -> Result<Vec<FaceRect>, CascadeError> {
    check_params(params)?;
    if gray.width() == 0 || gray.height() == 0 {
      return Ok(Vec::new());
    }
    match self {
      CascadeClassifier::Native(native) => Ok(native.detect_gray(gray, params)),
      #[cfg(feature = "opencv_backend")]
      CascadeClassifier::OpenCv(cv) => cv.detect(gray, params),
    }
  }
}

#[cfg(feature = "opencv_backend")]
fn load_backend(path: &Path) -> Result<CascadeClassifier, CascadeError> {
  Ok(CascadeClassifier::OpenCv(OpenCvCascade::load(path)?))
}

#[cfg(not(feature = "opencv_backend"))]
fn load_backend(path: &Path) -> Result<CascadeClassifier, CascadeError> {
  Ok(CascadeClassifier::Native(NativeCascade::load(path)?))
}

fn check_params(params: &DetectParams) -> Result<(), CascadeError> {
  // NaN 也在这里被拒绝
  if !(params.scale_factor > 1.0) {
    return Err(CascadeError::InvalidScaleFactor(params.scale_factor));
  }
  Ok(())
}

/// 基于积分图的原生实现，载入后不可变
#[derive(Debug, Clone)]
pub struct NativeCascade {
  window: (u32, u32),
  stages: Vec<Stage>,
  features: Features,
}

impl NativeCascade {
  /// 从 XML 文件载入
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CascadeError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let classifier = Self::from_xml(&text)?;
    info!(
      "级联分类器已载入: {} ({:?}, {} 级, 窗口 {}x{})",
      path.display(),
      classifier.feature_type(),
      classifier.stages.len(),
      classifier.window.0,
      classifier.window.1
    );
    Ok(classifier)
  }

  pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
    xml::parse_cascade(text)
  }

  pub fn window_size(&self) -> (u32, u32) {
    self.window
  }

  pub fn stage_count(&self) -> usize {
    self.stages.len()
  }

  pub fn feature_type(&self) -> FeatureType {
    match self.features {
      Features::Haar(_) => FeatureType::Haar,
      Features::Lbp(_) => FeatureType::Lbp,
    }
  }

  fn has_tilted(&self) -> bool {
    match &self.features {
      Features::Haar(features) => features.iter().any(|f| f.tilted),
      Features::Lbp(_) => false,
    }
  }

  /// 多尺度检测，返回聚类后的检测框（顺序不保证按位置排序）
  pub fn detect_multi_scale(
    &self,
    image: &DynamicImage,
    params: &DetectParams,
  ) -> Result<Vec<FaceRect>, CascadeError> {
    check_params(params)?;
    if is_empty_image(image) {
      return Ok(Vec::new());
    }
    Ok(self.detect_gray(&to_gray(image), params))
  }

  /// 参数已检查过的灰度图检测
  pub(crate) fn detect_gray(&self, gray: &GrayImage, params: &DetectParams) -> Vec<FaceRect> {
    let candidates = self.scan(gray, params);
    let faces = group_rectangles(&candidates, params.min_neighbors, GROUP_EPS);
    debug!("候选框 {} 个, 合并后 {} 个", candidates.len(), faces.len());
    faces
  }

  fn scan(&self, gray: &GrayImage, params: &DetectParams) -> Vec<FaceRect> {
    let (img_w, img_h) = gray.dimensions();
    let (win_w, win_h) = self.window;
    let (max_w, max_h) = params.max_size.unwrap_or((img_w, img_h));
    let (min_w, min_h) = params.min_size.unwrap_or((0, 0));
    let with_tilted = self.has_tilted();

    let mut hits = Vec::new();
    let mut factor = 1.0f64;
    loop {
      let window_w = (win_w as f64 * factor).round() as u32;
      let window_h = (win_h as f64 * factor).round() as u32;
      let scaled_w = (img_w as f64 / factor).round() as u32;
      let scaled_h = (img_h as f64 / factor).round() as u32;

      if scaled_w < win_w || scaled_h < win_h {
        break;
      }
      if window_w > max_w || window_h > max_h {
        break;
      }

      if window_w >= min_w && window_h >= min_h {
        let scaled = if scaled_w == img_w && scaled_h == img_h {
          Cow::Borrowed(gray)
        } else {
          Cow::Owned(imageops::resize(
            gray,
            scaled_w,
            scaled_h,
            FilterType::Triangle,
          ))
        };
        let integral = IntegralImages::new(&scaled, with_tilted);
        let step = if factor > 2.0 { 1 } else { 2 };

        for y in (0..=scaled_h - win_h).step_by(step) {
          for x in (0..=scaled_w - win_w).step_by(step) {
            if self.evaluate(&integral, x as i32, y as i32) {
              hits.push(FaceRect::new(
                (x as f64 * factor).round() as i32,
                (y as f64 * factor).round() as i32,
                window_w as i32,
                window_h as i32,
              ));
            }
          }
        }
      }

      factor *= params.scale_factor;
    }

    hits
  }

  /// 在 `(ox, oy)` 处的基础窗口上跑完全部级
  fn evaluate(&self, integral: &IntegralImages, ox: i32, oy: i32) -> bool {
    match &self.features {
      Features::Haar(features) => {
        let norm = self.variance_norm(integral, ox, oy);
        self.run_stages(|node| {
          let value = haar_value(integral, &features[node.feature], ox, oy) * norm;
          match node.split {
            Split::Threshold(threshold) => value < threshold as f64,
            Split::Subset(_) => false,
          }
        })
      }
      Features::Lbp(features) => self.run_stages(|node| {
        let code = lbp_code(integral, &features[node.feature], ox, oy);
        match node.split {
          Split::Subset(subset) => subset[(code >> 5) as usize] & (1u32 << (code & 31)) != 0,
          Split::Threshold(_) => false,
        }
      }),
    }
  }

  /// `go_left` 决定节点往左还是往右
  fn run_stages<F: Fn(&DecisionNode) -> bool>(&self, go_left: F) -> bool {
    for stage in &self.stages {
      let mut sum = 0.0f32;
      for weak in &stage.weak {
        let mut idx = 0usize;
        loop {
          let node = &weak.nodes[idx];
          let next = if go_left(node) { node.left } else { node.right };
          if next <= 0 {
            sum += weak.leaves[(-next) as usize];
            break;
          }
          idx = next as usize;
        }
      }
      if sum < stage.threshold {
        return false;
      }
    }
    true
  }

  /// 窗口内缩一个像素区域的标准差倒数
  fn variance_norm(&self, integral: &IntegralImages, ox: i32, oy: i32) -> f64 {
    let w = self.window.0 as i32 - 2;
    let h = self.window.1 as i32 - 2;
    if w <= 0 || h <= 0 {
      return 1.0;
    }
    let area = (w * h) as f64;
    let sum = integral.sum(ox + 1, oy + 1, w, h) as f64;
    let sq_sum = integral.sq_sum(ox + 1, oy + 1, w, h) as f64;
    let nf = area * sq_sum - sum * sum;
    let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };
    1.0 / nf
  }
}

fn haar_value(integral: &IntegralImages, feature: &HaarFeature, ox: i32, oy: i32) -> f64 {
  feature
    .rects
    .iter()
    .map(|r| {
      let sum = if feature.tilted {
        integral.tilted_sum(ox + r.x, oy + r.y, r.width, r.height)
      } else {
        integral.sum(ox + r.x, oy + r.y, r.width, r.height)
      };
      r.weight as f64 * sum as f64
    })
    .sum()
}

/// 中心格与周围八格比较得到的 8 位编码，左上为最高位，顺时针排列
fn lbp_code(integral: &IntegralImages, feature: &LbpFeature, ox: i32, oy: i32) -> u32 {
  let (w, h) = (feature.width, feature.height);
  let x0 = ox + feature.x;
  let y0 = oy + feature.y;
  let cell = |cx: i32, cy: i32| integral.sum(x0 + cx * w, y0 + cy * h, w, h);
  let center = cell(1, 1);
  let ring = [
    (0, 0, 128),
    (1, 0, 64),
    (2, 0, 32),
    (2, 1, 16),
    (2, 2, 8),
    (1, 2, 4),
    (0, 2, 2),
    (0, 1, 1),
  ];
  ring
    .iter()
    .filter(|(cx, cy, _)| cell(*cx, *cy) >= center)
    .map(|(_, _, bit)| *bit)
    .sum()
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use image::{Luma, Rgb, RgbImage};

  /// 8x8 窗口，单级单特征: 中心 4x4 比整个窗口亮时通过
  pub(crate) const BRIGHT_CENTER_HAAR: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>8</height>
  <width>8</width>
  <stageParams>
    <boostType>GAB</boostType>
    <maxDepth>1</maxDepth>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount>
    <featSize>1</featSize>
    <mode>BASIC</mode></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 8 8 -1.</_>
        <_>
          2 2 4 4 4.</_></rects></_></features></cascade>
</opencv_storage>
"#;

  /// 与上面同样的判据，用 LBP 写: 中心格比四周都亮时编码为 0，只接受 0
  pub(crate) const BRIGHT_CENTER_LBP: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade>
  <stageType>BOOST</stageType>
  <featureType>LBP</featureType>
  <height>9</height>
  <width>9</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>256</maxCatCount>
    <featSize>1</featSize></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 -2 -1 -1 -1 -1 -1 -1 -1</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rect>
        0 0 3 3</rect></_></features></cascade>
</opencv_storage>
"#;

  pub(crate) fn square_image(size: u32, square: (u32, u32, u32)) -> DynamicImage {
    let (sx, sy, side) = square;
    let mut image = RgbImage::new(size, size);
    for y in sy..sy + side {
      for x in sx..sx + side {
        image.put_pixel(x, y, Rgb([255, 255, 255]));
      }
    }
    DynamicImage::ImageRgb8(image)
  }

  #[test]
  fn loads_haar_cascade() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    assert_eq!(classifier.window_size(), (8, 8));
    assert_eq!(classifier.stage_count(), 1);
    assert_eq!(classifier.feature_type(), FeatureType::Haar);
  }

  #[test]
  fn flat_image_has_no_faces() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([90])));
    let faces = classifier
      .detect_multi_scale(&image, &DetectParams::default())
      .unwrap();
    assert!(faces.is_empty());
  }

  #[test]
  fn finds_bright_square() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(48, (20, 20, 6));
    let params = DetectParams {
      min_neighbors: 1,
      ..DetectParams::default()
    };
    let faces = classifier.detect_multi_scale(&image, &params).unwrap();
    assert!(!faces.is_empty());
    for face in &faces {
      // 每个框都要和白色方块相交
      assert!(face.x < 26 && face.x + face.width > 20, "{:?}", face);
      assert!(face.y < 26 && face.y + face.height > 20, "{:?}", face);
    }
  }

  #[test]
  fn raw_hits_without_grouping() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(48, (20, 20, 6));
    let raw = classifier
      .detect_multi_scale(
        &image,
        &DetectParams {
          min_neighbors: 0,
          ..DetectParams::default()
        },
      )
      .unwrap();
    let grouped = classifier
      .detect_multi_scale(
        &image,
        &DetectParams {
          min_neighbors: 1,
          ..DetectParams::default()
        },
      )
      .unwrap();
    assert!(raw.len() >= grouped.len());
  }

  #[test]
  fn lbp_cascade_accepts_only_bright_center() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_LBP).unwrap();
    assert_eq!(classifier.feature_type(), FeatureType::Lbp);
    let params = DetectParams {
      min_neighbors: 0,
      ..DetectParams::default()
    };

    // 9x9 图，正好一个窗口，中心 3x3 为白
    let bright = square_image(9, (3, 3, 3));
    let faces = classifier.detect_multi_scale(&bright, &params).unwrap();
    assert_eq!(faces, vec![FaceRect::new(0, 0, 9, 9)]);

    let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(9, 9, Luma([10])));
    assert!(classifier.detect_multi_scale(&flat, &params).unwrap().is_empty());
  }

  #[test]
  fn rejects_bad_scale_factor() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(16, (4, 4, 4));
    let params = DetectParams {
      scale_factor: 1.0,
      ..DetectParams::default()
    };
    assert!(matches!(
      classifier.detect_multi_scale(&image, &params),
      Err(CascadeError::InvalidScaleFactor(_))
    ));
  }

  #[test]
  fn empty_image_has_no_faces() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    let faces = classifier
      .detect_multi_scale(&image, &DetectParams::default())
      .unwrap();
    assert!(faces.is_empty());
  }

  #[test]
  fn image_smaller_than_window_has_no_faces() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(6, (1, 1, 3));
    let faces = classifier
      .detect_multi_scale(&image, &DetectParams::default())
      .unwrap();
    assert!(faces.is_empty());
  }

  #[test]
  fn min_size_skips_small_windows() {
    let classifier = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(48, (20, 20, 6));
    let params = DetectParams {
      min_neighbors: 0,
      min_size: Some((20, 20)),
      ..DetectParams::default()
    };
    let faces = classifier.detect_multi_scale(&image, &params).unwrap();
    assert!(faces.iter().all(|f| f.width >= 20 && f.height >= 20));
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = NativeCascade::load("/nonexistent/cascade.xml").unwrap_err();
    assert!(matches!(err, CascadeError::Io { .. }));
    assert!(matches!(
      CascadeClassifier::load("/nonexistent/cascade.xml"),
      Err(CascadeError::Io { .. })
    ));
  }

  #[test]
  fn wrapper_detects_on_gray_frames() {
    let mut classifier = CascadeClassifier::from_xml(BRIGHT_CENTER_LBP).unwrap();
    let params = DetectParams {
      min_neighbors: 0,
      ..DetectParams::default()
    };
    let bright = to_gray(&square_image(9, (3, 3, 3)));
    assert_eq!(
      classifier.detect_multi_scale(&bright, &params).unwrap(),
      vec![FaceRect::new(0, 0, 9, 9)]
    );
    assert!(
      classifier
        .detect_multi_scale(&GrayImage::new(0, 0), &params)
        .unwrap()
        .is_empty()
    );
    let bad = DetectParams {
      scale_factor: f64::NAN,
      ..params
    };
    assert!(matches!(
      classifier.detect_multi_scale(&bright, &bad),
      Err(CascadeError::InvalidScaleFactor(_))
    ));
  }

  #[test]
  fn wrapper_and_native_agree() {
    let native = NativeCascade::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let mut wrapper = CascadeClassifier::from_xml(BRIGHT_CENTER_HAAR).unwrap();
    let image = square_image(48, (20, 20, 6));
    let params = DetectParams {
      min_neighbors: 1,
      ..DetectParams::default()
    };
    assert_eq!(
      native.detect_multi_scale(&image, &params).unwrap(),
      wrapper.detect_multi_scale(&to_gray(&image), &params).unwrap()
    );
  }
}
