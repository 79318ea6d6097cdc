// 该文件是 Mianxiang （面相） 项目的一部分。
// src/input.rs - 摄像头输入
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

use thiserror::Error;
use tracing::info;

use crate::frame::Frame;

#[cfg(feature = "v4l_input")]
mod v4l_camera;
#[cfg(feature = "v4l_input")]
pub use self::v4l_camera::{V4l2Camera, V4l2CameraError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_camera;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_camera::{GStreamerCamera, GStreamerCameraError};

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("未启用任何摄像头后端")]
  Unsupported,
  #[cfg(feature = "v4l_input")]
  #[error("V4L2 camera error: {0}")]
  V4l2(#[from] V4l2CameraError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer camera error: {0}")]
  GStreamer(#[from] GStreamerCameraError),
}

/// 逐帧读取的采集设备。返回空帧表示这一次没有拿到有效画面，调用方应重试。
pub trait CaptureDevice {
  fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

impl<T: CaptureDevice + ?Sized> CaptureDevice for Box<T> {
  fn read_frame(&mut self) -> Result<Frame, CameraError> {
    (**self).read_frame()
  }
}

pub enum CameraWrapper {
  #[cfg(feature = "v4l_input")]
  V4l2(V4l2Camera),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerCamera),
}

impl CaptureDevice for CameraWrapper {
  fn read_frame(&mut self) -> Result<Frame, CameraError> {
    match *self {
      #[cfg(feature = "v4l_input")]
      CameraWrapper::V4l2(ref mut camera) => camera.read_frame(),
      #[cfg(feature = "gstreamer_input")]
      CameraWrapper::GStreamer(ref mut camera) => camera.read_frame(),
    }
  }
}

/// 打开 `/dev/video<id>`，使用编译进来的第一个后端
pub fn open_camera(id: u32) -> Result<CameraWrapper, CameraError> {
  let device = format!("/dev/video{}", id);
  info!("打开摄像头设备: {}", device);
  open_backend(&device)
}

#[cfg(feature = "v4l_input")]
fn open_backend(device: &str) -> Result<CameraWrapper, CameraError> {
  Ok(CameraWrapper::V4l2(V4l2Camera::new(device)?))
}

#[cfg(all(feature = "gstreamer_input", not(feature = "v4l_input")))]
fn open_backend(device: &str) -> Result<CameraWrapper, CameraError> {
  Ok(CameraWrapper::GStreamer(GStreamerCamera::new(device)?))
}

#[cfg(not(any(feature = "v4l_input", feature = "gstreamer_input")))]
fn open_backend(device: &str) -> Result<CameraWrapper, CameraError> {
  tracing::warn!("未启用 v4l_input 或 gstreamer_input 特性，无法打开 {}", device);
  Err(CameraError::Unsupported)
}
