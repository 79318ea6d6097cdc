// 该文件是 Mianxiang （面相） 项目的一部分。
// src/input/v4l_camera.rs - V4L2 摄像头
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{CameraError, CaptureDevice};
use crate::frame::Frame;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum V4l2CameraError {
  #[error("无法打开设备 {device}: {source}")]
  Open {
    device: String,
    #[source]
    source: std::io::Error,
  },
  #[error("设备不支持 YUYV，协商得到 {0}")]
  Format(FourCC),
  #[error("V4L2 IO 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("捕获流已关闭")]
  StreamClosed,
}

/// YUYV mmap 采集
///
/// `Stream` 借用 `Device`，所以设备放在 `Pin<Box>` 里保证地址不变，
/// 流在 `Drop` 中先于设备释放。
pub struct V4l2Camera {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl V4l2Camera {
  pub fn new(device_path: &str) -> Result<Self, V4l2CameraError> {
    let device = Box::pin(Device::with_path(device_path).map_err(|source| {
      V4l2CameraError::Open {
        device: device_path.to_string(),
        source,
      }
    })?);

    let mut format = device.format()?;
    format.width = WIDTH;
    format.height = HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4l2CameraError::Format(format.fourcc));
    }
    info!(
      "V4L2 设备 {} 已打开: {}x{} YUYV",
      device_path, format.width, format.height
    );

    let mut camera = Self {
      device,
      stream: None,
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    };

    // SAFETY: device 固定在堆上不会移动；stream 与 device 同属一个结构体，
    // Drop 中先 take stream 再释放 device
    let device_ref: &Device = &camera.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, BUFFERS)?
    };
    camera.stream = Some(stream);
    Ok(camera)
  }
}

impl Drop for V4l2Camera {
  fn drop(&mut self) {
    self.stream.take();
  }
}

/// YUYV 4:2:2 转 RGB，两个像素共享一组 U V
pub(crate) fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Option<RgbImage> {
  let pixels = (width * height) as usize;
  if yuyv.len() < pixels * 2 {
    return None;
  }
  let mut rgb = Vec::with_capacity(pixels * 3);
  for chunk in yuyv[..pixels * 2].chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
      rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
      rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
    }
  }
  RgbImage::from_raw(width, height, rgb)
}

impl CaptureDevice for V4l2Camera {
  fn read_frame(&mut self) -> Result<Frame, CameraError> {
    let stream = self
      .stream
      .as_mut()
      .ok_or(V4l2CameraError::StreamClosed)?;
    let (buffer, meta) = stream.next().map_err(V4l2CameraError::Io)?;
    let used = (meta.bytesused as usize).min(buffer.len());

    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let index = self.frame_index;
    self.frame_index += 1;

    match yuyv_to_rgb(&buffer[..used], self.width, self.height) {
      Some(image) => Ok(Frame::new(image, index, timestamp_ms)),
      None => {
        debug!("第 {} 帧数据不完整 ({} 字节)，作为空帧返回", index, used);
        Ok(Frame::empty(index, timestamp_ms))
      }
    }
  }
}
