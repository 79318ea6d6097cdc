// 该文件是 Mianxiang （面相） 项目的一部分。
// src/input/gstreamer_camera.rs - GStreamer 摄像头
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

//! # GStreamer 摄像头
//!
//! 管道为 `v4l2src ! videoconvert ! video/x-raw,format=RGB ! appsink`。
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::time::Instant;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use super::{CameraError, CaptureDevice};
use crate::frame::Frame;

#[derive(Error, Debug)]
pub enum GStreamerCameraError {
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

pub struct GStreamerCamera {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  frame_index: u64,
  start_time: Instant,
}

impl GStreamerCamera {
  pub fn new(device: &str) -> Result<Self, GStreamerCameraError> {
    gst::init()?;

    let description = format!(
      "v4l2src device={} ! videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true name=sink",
      device
    );
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerCameraError::PipelineError("Failed to create pipeline".to_string()))?;
    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerCameraError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerCameraError::AppSinkNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsink,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

impl Drop for GStreamerCamera {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

/// 按行拷贝，去掉行尾填充；BGR 顺带转成 RGB
fn sample_to_image(sample: &gst::Sample) -> Result<RgbImage, GStreamerCameraError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No caps in sample".to_string()))?;
  let info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerCameraError::VideoInfoError)?;

  let (width, height) = (info.width() as usize, info.height() as usize);
  let stride = info.stride()[0] as usize;
  let map = buffer.map_readable().map_err(|e| {
    GStreamerCameraError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * height.saturating_sub(1) + width * 3;
  if height > 0 && data.len() < expected {
    return Err(GStreamerCameraError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let bgr = match info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerCameraError::UnsupportedFormat),
  };

  let mut rgb = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let line = &data[row * stride..row * stride + width * 3];
    if bgr {
      for px in line.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      rgb.extend_from_slice(line);
    }
  }
  RgbImage::from_raw(width as u32, height as u32, rgb)
    .ok_or_else(|| GStreamerCameraError::PipelineError("Failed to build RGB image".to_string()))
}

impl CaptureDevice for GStreamerCamera {
  fn read_frame(&mut self) -> Result<Frame, CameraError> {
    let sample = self
      .appsink
      .pull_sample()
      .map_err(GStreamerCameraError::GStreamerBoolError)?;
    let image = sample_to_image(&sample)?;
    let index = self.frame_index;
    self.frame_index += 1;
    Ok(Frame::new(
      image,
      index,
      self.start_time.elapsed().as_millis() as u64,
    ))
  }
}
