// 该文件是 Mianxiang （面相） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的级联文件与图片
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

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use mianxiang::cascade::{CascadeClassifier, DetectParams};

/// 9x9 窗口，中心 3x3 比四周都亮时通过
pub const BRIGHT_CENTER_LBP: &str = r#"<?xml version="1.0"?>
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

/// 不做分组，9x9 的图只有一个窗口
pub fn params() -> DetectParams {
  DetectParams {
    min_neighbors: 0,
    ..DetectParams::default()
  }
}

pub fn classifier() -> CascadeClassifier {
  CascadeClassifier::from_xml(BRIGHT_CENTER_LBP).unwrap()
}

pub fn write_cascade(dir: &Path) -> PathBuf {
  let path = dir.join("cascade.xml");
  std::fs::write(&path, BRIGHT_CENTER_LBP).unwrap();
  path
}

/// 中心 3x3 为亮色的 9x9 图，带一点颜色变化
pub fn face_image() -> RgbImage {
  RgbImage::from_fn(9, 9, |x, y| {
    if (3..6).contains(&x) && (3..6).contains(&y) {
      Rgb([250, 240 - (x * 5) as u8, 230])
    } else {
      Rgb([(x * 10) as u8, (y * 10) as u8, 20])
    }
  })
}

pub fn flat_image() -> RgbImage {
  RgbImage::from_pixel(9, 9, Rgb([60, 60, 60]))
}

pub fn write_png(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
  let path = dir.join(name);
  image.save(&path).unwrap();
  path
}
