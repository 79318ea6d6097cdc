// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output.rs - 显示输出
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

use std::time::Duration;

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "directory_record", feature = "gstreamer_output"))]
use crate::FromUrlWithScheme;
use crate::frame::FaceRect;

pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordDisplay, DirectoryRecordError};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display::{GStreamerDisplay, GStreamerDisplayError};

/// 命令行未指定 `--display` 时的显示输出
#[cfg(feature = "gstreamer_output")]
pub const DEFAULT_DISPLAY: &str = "gst://window";
/// 命令行未指定 `--display` 时的显示输出
#[cfg(not(feature = "gstreamer_output"))]
pub const DEFAULT_DISPLAY: &str = "null:";

#[derive(Error, Debug)]
pub enum DisplayError {
  #[error("字体加载失败: {0}")]
  Font(#[from] ab_glyph::InvalidFont),
  #[error("图像保存失败: {0}")]
  Image(#[from] image::ImageError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecord(#[from] DirectoryRecordError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 显示错误: {0}")]
  GStreamer(#[from] GStreamerDisplayError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 显示面：接收已经画好检测框的帧
pub trait Display {
  fn show(&mut self, image: &RgbImage, faces: &[FaceRect]) -> Result<(), DisplayError>;

  /// 最多等待 `timeout`，用户要求退出（按键、关闭窗口）时返回 true
  fn wait_key(&mut self, timeout: Duration) -> bool;
}

impl<T: Display + ?Sized> Display for Box<T> {
  fn show(&mut self, image: &RgbImage, faces: &[FaceRect]) -> Result<(), DisplayError> {
    (**self).show(image, faces)
  }

  fn wait_key(&mut self, timeout: Duration) -> bool {
    (**self).wait_key(timeout)
  }
}

/// 什么都不显示，只按时等待
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
  fn show(&mut self, _image: &RgbImage, _faces: &[FaceRect]) -> Result<(), DisplayError> {
    Ok(())
  }

  fn wait_key(&mut self, timeout: Duration) -> bool {
    if !timeout.is_zero() {
      std::thread::sleep(timeout);
    }
    false
  }
}

pub enum DisplayWrapper {
  Null(NullDisplay),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordDisplay),
  #[cfg(feature = "gstreamer_output")]
  GStreamer(GStreamerDisplay),
}

impl DisplayWrapper {
  /// 没有给出 `--display` 时使用空显示
  pub fn from_option(url: Option<&Url>) -> Result<Self, DisplayError> {
    match url {
      Some(url) => Self::from_url(url),
      None => Ok(DisplayWrapper::Null(NullDisplay)),
    }
  }
}

impl FromUrl for DisplayWrapper {
  type Error = DisplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "null" => Ok(DisplayWrapper::Null(NullDisplay)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordDisplay::SCHEME => Ok(DisplayWrapper::DirectoryRecord(
        DirectoryRecordDisplay::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_output")]
      GStreamerDisplay::SCHEME => {
        Ok(DisplayWrapper::GStreamer(GStreamerDisplay::from_url(url)?))
      }
      other => Err(DisplayError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Display for DisplayWrapper {
  fn show(&mut self, image: &RgbImage, faces: &[FaceRect]) -> Result<(), DisplayError> {
    match self {
      DisplayWrapper::Null(display) => display.show(image, faces),
      #[cfg(feature = "directory_record")]
      DisplayWrapper::DirectoryRecord(display) => display.show(image, faces),
      #[cfg(feature = "gstreamer_output")]
      DisplayWrapper::GStreamer(display) => display.show(image, faces),
    }
  }

  fn wait_key(&mut self, timeout: Duration) -> bool {
    match self {
      DisplayWrapper::Null(display) => display.wait_key(timeout),
      #[cfg(feature = "directory_record")]
      DisplayWrapper::DirectoryRecord(display) => display.wait_key(timeout),
      #[cfg(feature = "gstreamer_output")]
      DisplayWrapper::GStreamer(display) => display.wait_key(timeout),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_url_means_null_display() {
    assert!(matches!(
      DisplayWrapper::from_option(None),
      Ok(DisplayWrapper::Null(_))
    ));
  }

  #[test]
  fn default_display_is_compiled_in() {
    let url = Url::parse(DEFAULT_DISPLAY).unwrap();
    if cfg!(feature = "gstreamer_output") {
      assert_eq!(url.scheme(), "gst");
    } else {
      assert!(matches!(
        DisplayWrapper::from_url(&url),
        Ok(DisplayWrapper::Null(_))
      ));
    }
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("ftp://example.com/x").unwrap();
    assert!(matches!(
      DisplayWrapper::from_url(&url),
      Err(DisplayError::SchemeMismatch(s)) if s == "ftp"
    ));
  }

  #[test]
  fn null_display_never_quits() {
    let mut display = NullDisplay;
    display.show(&RgbImage::new(4, 4), &[]).unwrap();
    assert!(!display.wait_key(Duration::ZERO));
  }
}
