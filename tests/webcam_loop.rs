// 该文件是 Mianxiang （面相） 项目的一部分。
// tests/webcam_loop.rs - 摄像头检测循环
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

mod common;

use std::collections::VecDeque;
use std::time::Duration;

use image::RgbImage;
use mianxiang::frame::{FaceRect, Frame, rgb_to_gray};
use mianxiang::input::{CameraError, CaptureDevice};
use mianxiang::output::{Display, DisplayError};
use mianxiang::task::{
  QuitSignal, StopReason, WEBCAM_USAGE, WebcamOptions, WebcamTask, report, webcam_flow,
};

/// 按脚本返回帧，脚本用完后报错
struct ScriptedCamera {
  frames: VecDeque<Frame>,
  reads: usize,
}

impl ScriptedCamera {
  fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
    Self {
      frames: frames.into_iter().collect(),
      reads: 0,
    }
  }
}

impl CaptureDevice for ScriptedCamera {
  fn read_frame(&mut self) -> Result<Frame, CameraError> {
    self.reads += 1;
    self.frames.pop_front().ok_or(CameraError::Unsupported)
  }
}

#[derive(Default)]
struct RecordingDisplay {
  shown: Vec<Vec<FaceRect>>,
  quit_after: Option<usize>,
}

impl Display for RecordingDisplay {
  fn show(&mut self, _image: &RgbImage, faces: &[FaceRect]) -> Result<(), DisplayError> {
    self.shown.push(faces.to_vec());
    Ok(())
  }

  fn wait_key(&mut self, _timeout: Duration) -> bool {
    self.quit_after.is_some_and(|n| self.shown.len() >= n)
  }
}

fn face(index: u64) -> Frame {
  Frame::new(common::face_image(), index, index * 33)
}

fn task(max_frames: Option<u64>) -> WebcamTask {
  WebcamTask::new(0, common::classifier(), common::params())
    .unwrap()
    .with_max_frames(max_frames)
}

#[test]
fn empty_frames_are_skipped() {
  let mut camera =
    ScriptedCamera::new([Frame::empty(0, 0), face(1), Frame::empty(2, 0), face(3)]);
  let mut display = RecordingDisplay::default();
  let (_tx, quit) = QuitSignal::channel();
  let mut out = Vec::new();

  let mut task = task(Some(2));
  let reason = task.run(&mut camera, &mut display, &quit, &mut out).unwrap();
  assert_eq!(reason, StopReason::FrameLimit);
  assert_eq!(camera.reads, 4);
  assert_eq!(task.processed_frames(), 2);
  assert_eq!(display.shown, vec![vec![FaceRect::new(0, 0, 9, 9)]; 2]);
  assert_eq!(
    String::from_utf8(out).unwrap(),
    "start reading camera device: 0\nfound 1 faces\nfound 1 faces\n"
  );
}

#[test]
fn frames_are_detected_on_their_gray_version() {
  let expected = common::classifier()
    .detect_multi_scale(&rgb_to_gray(&common::face_image()), &common::params())
    .unwrap();
  let mut camera = ScriptedCamera::new([face(0)]);
  let mut display = RecordingDisplay::default();
  let (_tx, quit) = QuitSignal::channel();
  let mut out = Vec::new();

  let mut task = task(Some(1));
  task.run(&mut camera, &mut display, &quit, &mut out).unwrap();
  assert_eq!(display.shown, vec![expected]);
}

#[test]
fn read_error_stops_with_device_failure() {
  let mut camera = ScriptedCamera::new([face(0)]);
  let mut display = RecordingDisplay::default();
  let (_tx, quit) = QuitSignal::channel();
  let mut out = Vec::new();

  let reason = task(None)
    .run(&mut camera, &mut display, &quit, &mut out)
    .unwrap();
  assert_eq!(reason, StopReason::DeviceFailure);
  assert_eq!(display.shown.len(), 1);
  assert!(String::from_utf8(out).unwrap().ends_with("found 1 faces\ncannot read device 0\n"));
}

#[test]
fn quit_signal_stops_after_current_frame() {
  let mut camera = ScriptedCamera::new((0..5).map(face));
  let mut display = RecordingDisplay::default();
  let (tx, quit) = QuitSignal::channel();
  tx.send(()).unwrap();
  let mut out = Vec::new();

  let reason = task(None)
    .run(&mut camera, &mut display, &quit, &mut out)
    .unwrap();
  assert_eq!(reason, StopReason::UserQuit);
  assert_eq!(display.shown.len(), 1);
}

#[test]
fn key_press_stops_loop() {
  let mut camera = ScriptedCamera::new((0..5).map(face));
  let mut display = RecordingDisplay {
    quit_after: Some(3),
    ..RecordingDisplay::default()
  };
  let (_tx, quit) = QuitSignal::channel();
  let mut out = Vec::new();

  let reason = task(None)
    .run(&mut camera, &mut display, &quit, &mut out)
    .unwrap();
  assert_eq!(reason, StopReason::UserQuit);
  assert_eq!(display.shown.len(), 3);
  assert_eq!(camera.reads, 3);
}

#[test]
fn flat_frames_have_no_faces() {
  let mut camera = ScriptedCamera::new([Frame::new(common::flat_image(), 0, 0)]);
  let mut display = RecordingDisplay::default();
  let (_tx, quit) = QuitSignal::channel();
  let mut out = Vec::new();

  let reason = task(Some(1))
    .run(&mut camera, &mut display, &quit, &mut out)
    .unwrap();
  assert_eq!(reason, StopReason::FrameLimit);
  assert_eq!(display.shown, vec![Vec::<FaceRect>::new()]);
}

#[test]
fn usage_without_arguments() {
  let mut out = Vec::new();
  let result = webcam_flow(Some(0), None, &WebcamOptions::default(), &mut out);
  report(result, &mut out).unwrap();
  let text = String::from_utf8(out).unwrap();
  assert_eq!(text, format!("{}\n", WEBCAM_USAGE));
  assert_eq!(text.lines().count(), 2);
}
