// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/directory_record.rs - 目录记录显示
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

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use super::{Display, DisplayError};
use crate::frame::FaceRect;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把每一帧存成 `<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.png`。
/// 默认只存有检测结果的帧，`?always` 时全部保存。
pub struct DirectoryRecordDisplay {
  directory: PathBuf,
  frame_counter: u16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordDisplay {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordDisplay {
  type Error = DirectoryRecordError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordError::SchemeMismatch);
    }
    let always = uri.query_pairs().any(|(k, _)| k == "always");
    Ok(Self::new(uri.path(), always))
  }
}

impl DirectoryRecordDisplay {
  pub fn new<P: AsRef<Path>>(directory: P, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      frame_counter: 0,
      always,
    }
  }

  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn frame_path(&mut self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  pub fn save(&mut self, image: &RgbImage, faces: &[FaceRect]) -> Result<Option<PathBuf>, DirectoryRecordError> {
    if !self.always && faces.is_empty() {
      return Ok(None);
    }
    let path = self.frame_path(Utc::now())?;
    image.save(&path)?;
    debug!("已保存帧: {}", path.display());
    Ok(Some(path))
  }
}

impl Display for DirectoryRecordDisplay {
  fn show(&mut self, image: &RgbImage, faces: &[FaceRect]) -> Result<(), DisplayError> {
    self.save(image, faces)?;
    Ok(())
  }

  fn wait_key(&mut self, timeout: Duration) -> bool {
    if !timeout.is_zero() {
      std::thread::sleep(timeout);
    }
    false
  }
}
