// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 窗口显示
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

//! # GStreamer 窗口显示
//!
//! 管道为 `appsrc ! videoconvert ! autovideosink`，URL 形如 `gst://window`。
//! 首帧到达时才根据帧尺寸设置 caps；关闭窗口（EOS 或管道错误）视为退出。

use std::time::Duration;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use super::{Display, DisplayError};
use crate::frame::FaceRect;
use crate::{FromUrl, FromUrlWithScheme};

const FPS: u64 = 30;

#[derive(Error, Debug)]
pub enum GStreamerDisplayError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
}

pub struct GStreamerDisplay {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  size: Option<(u32, u32)>,
  frame_count: u64,
}

impl FromUrlWithScheme for GStreamerDisplay {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerDisplay {
  type Error = GStreamerDisplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerDisplayError::SchemeMismatch);
    }

    gst::init()?;

    let description = "appsrc name=src ! videoconvert ! autovideosink";
    info!("Creating display pipeline: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayError::PipelineError("Failed to create pipeline".to_string()))?;
    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayError::AppSrcNotFound)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsrc,
      size: None,
      frame_count: 0,
    })
  }
}

impl GStreamerDisplay {
  fn ensure_caps(&mut self, width: u32, height: u32) {
    if self.size == Some((width, height)) {
      return;
    }
    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(FPS as i32, 1))
      .build();
    self.appsrc.set_caps(Some(&caps));
    self.size = Some((width, height));
    info!("Display caps: {}x{}", width, height);
  }

  fn push_frame(&mut self, image: &RgbImage) -> Result<(), GStreamerDisplayError> {
    self.ensure_caps(image.width(), image.height());

    let mut buffer = gst::Buffer::from_slice(image.as_raw().clone());
    let timestamp = self.frame_count * 1_000_000_000 / FPS;
    self.frame_count += 1;
    if let Some(buffer_ref) = buffer.get_mut() {
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(1_000_000_000 / FPS));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerDisplayError::PipelineError(format!("Failed to push buffer: {:?}", e)))?;
    Ok(())
  }
}

impl Display for GStreamerDisplay {
  fn show(&mut self, image: &RgbImage, _faces: &[FaceRect]) -> Result<(), DisplayError> {
    self.push_frame(image)?;
    Ok(())
  }

  fn wait_key(&mut self, timeout: Duration) -> bool {
    let Some(bus) = self.pipeline.bus() else {
      return false;
    };
    let timeout = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
    match bus.timed_pop_filtered(
      timeout,
      &[gst::MessageType::Eos, gst::MessageType::Error],
    ) {
      Some(msg) => {
        match msg.view() {
          gst::MessageView::Error(err) => warn!("显示管道错误: {}", err.error()),
          _ => info!("显示窗口已关闭"),
        }
        true
      }
      None => false,
    }
  }
}

impl Drop for GStreamerDisplay {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer display pipeline: {}", e);
    }
    info!("Display closed. Total frames shown: {}", self.frame_count);
  }
}
