// 该文件是 Mianxiang （面相） 项目的一部分。
// src/task.rs - 摄像头检测与图片比对流程
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

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cascade::{CascadeClassifier, DetectParams};
use crate::compare::{FaceComparator, Similarity};
use crate::config::{CompareOptions, FaceSelection};
use crate::error::FlowError;
use crate::frame::{FaceRect, Frame, rgb_to_gray, to_gray};
use crate::input::{CaptureDevice, open_camera};
use crate::output::draw::Draw;
use crate::output::{Display, DisplayError, DisplayWrapper};

pub const WEBCAM_USAGE: &str =
  "How to run:\n\tface-detect-webcam [camera ID] [classifier XML file]";

pub const IMAGE_USAGE: &str = "Please send these arguments to us.\nHow to run:\n\tface-detect-image [path/to/file/image1.jpg] [path/to/file/image2.jpg] [classifier XML file]";

pub const COMPARE_USAGE: &str =
  "How to run:\n\tface-compare [path/to/file/image1.jpg] [path/to/file/image2.jpg]";

const KEY_POLL: Duration = Duration::from_millis(1);
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// Ctrl-C 退出信号
pub struct QuitSignal {
  rx: Receiver<()>,
}

impl QuitSignal {
  /// 安装 Ctrl-C 处理函数。收到信号 30 秒后仍未退出则强制结束进程。
  pub fn install() -> Self {
    let (tx, rx) = mpsc::channel();
    let installed = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    if let Err(e) = installed {
      // 处理函数里持有的 tx 已随闭包一起丢弃，rx 永远收不到信号
      warn!("无法安装 Ctrl-C 处理函数: {}", e);
    }
    Self { rx }
  }

  /// 手动触发的信号，不经过 Ctrl-C
  pub fn channel() -> (Sender<()>, Self) {
    let (tx, rx) = mpsc::channel();
    (tx, Self { rx })
  }

  pub fn requested(&self) -> bool {
    self.rx.try_recv().is_ok()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// 按键、关闭窗口或 Ctrl-C
  UserQuit,
  /// 读帧失败
  DeviceFailure,
  /// 达到 `--max-frames`
  FrameLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
  Capturing,
  Stopped(StopReason),
}

/// 摄像头检测循环：读帧、检测、画框、显示，直到退出
pub struct WebcamTask {
  device_id: u32,
  classifier: CascadeClassifier,
  params: DetectParams,
  draw: Draw,
  max_frames: Option<u64>,
  processed: u64,
}

impl WebcamTask {
  pub fn new(
    device_id: u32,
    classifier: CascadeClassifier,
    params: DetectParams,
  ) -> Result<Self, FlowError> {
    Ok(Self {
      device_id,
      classifier,
      params,
      draw: Draw::new().map_err(DisplayError::from)?,
      max_frames: None,
      processed: 0,
    })
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn processed_frames(&self) -> u64 {
    self.processed
  }

  /// 处理一次读帧。空帧直接返回 `Capturing`，不计入帧数。
  pub fn step<C, D, W>(
    &mut self,
    camera: &mut C,
    display: &mut D,
    quit: &QuitSignal,
    out: &mut W,
  ) -> Result<CaptureState, FlowError>
  where
    C: CaptureDevice + ?Sized,
    D: Display + ?Sized,
    W: Write,
  {
    let Frame { mut image, index, .. } = match camera.read_frame() {
      Ok(frame) if frame.is_empty() => {
        debug!("第 {} 帧为空，跳过", frame.index);
        return Ok(CaptureState::Capturing);
      }
      Ok(frame) => frame,
      Err(e) => {
        error!("读取摄像头失败: {}", e);
        let err = FlowError::Device {
          id: self.device_id,
          reason: e.to_string(),
        };
        writeln!(out, "{}", err)?;
        return Ok(CaptureState::Stopped(StopReason::DeviceFailure));
      }
    };

    let now = Instant::now();
    let gray = rgb_to_gray(&image);
    let faces = self.classifier.detect_multi_scale(&gray, &self.params)?;
    debug!("第 {} 帧检测耗时: {:.2?}", index, now.elapsed());
    writeln!(out, "found {} faces", faces.len())?;

    self.draw.draw_faces(&mut image, &faces);
    display.show(&image, &faces)?;
    self.processed += 1;

    if display.wait_key(KEY_POLL) || quit.requested() {
      info!("用户要求退出");
      return Ok(CaptureState::Stopped(StopReason::UserQuit));
    }
    if self.max_frames.is_some_and(|n| self.processed >= n) {
      info!("达到指定帧数 {}, 退出任务循环", self.processed);
      return Ok(CaptureState::Stopped(StopReason::FrameLimit));
    }
    Ok(CaptureState::Capturing)
  }

  pub fn run<C, D, W>(
    &mut self,
    camera: &mut C,
    display: &mut D,
    quit: &QuitSignal,
    out: &mut W,
  ) -> Result<StopReason, FlowError>
  where
    C: CaptureDevice + ?Sized,
    D: Display + ?Sized,
    W: Write,
  {
    writeln!(out, "start reading camera device: {}", self.device_id)?;
    loop {
      if let CaptureState::Stopped(reason) = self.step(camera, display, quit, out)? {
        info!("任务结束: {:?}，共处理 {} 帧", reason, self.processed);
        return Ok(reason);
      }
    }
  }
}

/// 摄像头流程的可选项
#[derive(Debug, Clone, Default)]
pub struct WebcamOptions {
  pub display: Option<Url>,
  pub params: DetectParams,
  pub max_frames: Option<u64>,
}

fn load_classifier(path: &Path) -> Result<CascadeClassifier, FlowError> {
  CascadeClassifier::load(path).map_err(|source| FlowError::ClassifierLoad {
    path: path.to_path_buf(),
    source,
  })
}

fn decode(path: &Path) -> Result<DynamicImage, FlowError> {
  image::open(path).map_err(|source| FlowError::Decode {
    path: path.to_path_buf(),
    source,
  })
}

/// 完整的摄像头流程：参数检查，加载分类器，打开摄像头和显示，然后进入循环
pub fn webcam_flow<W: Write>(
  device_id: Option<u32>,
  classifier: Option<&Path>,
  options: &WebcamOptions,
  out: &mut W,
) -> Result<StopReason, FlowError> {
  let (Some(device_id), Some(classifier)) = (device_id, classifier) else {
    return Err(FlowError::Usage(WEBCAM_USAGE));
  };

  let classifier = load_classifier(classifier)?;
  let mut task =
    WebcamTask::new(device_id, classifier, options.params)?.with_max_frames(options.max_frames);

  let mut camera = open_camera(device_id).map_err(|e| FlowError::Device {
    id: device_id,
    reason: e.to_string(),
  })?;
  let mut display = DisplayWrapper::from_option(options.display.as_ref())?;
  let quit = QuitSignal::install();

  task.run(&mut camera, &mut display, &quit, out)
}

/// 图片比对流程的可选项
#[derive(Debug, Clone, Default)]
pub struct ImagePairOptions {
  pub compare: CompareOptions,
  pub params: DetectParams,
  pub selection: FaceSelection,
  pub annotate_dir: Option<PathBuf>,
}

/// 两张图各检测一次，各取一张脸裁剪后交给比对器
pub struct ImagePairTask {
  classifier: CascadeClassifier,
  params: DetectParams,
  selection: FaceSelection,
  annotate_dir: Option<PathBuf>,
  comparator: FaceComparator,
}

impl ImagePairTask {
  pub fn new(classifier: CascadeClassifier, options: &ImagePairOptions) -> Self {
    Self {
      classifier,
      params: options.params,
      selection: options.selection,
      annotate_dir: options.annotate_dir.clone(),
      comparator: FaceComparator::new(&options.compare),
    }
  }

  fn detect<W: Write>(
    &mut self,
    image: &DynamicImage,
    out: &mut W,
  ) -> Result<Vec<FaceRect>, FlowError> {
    let faces = self.classifier.detect_multi_scale(&to_gray(image), &self.params)?;
    writeln!(out, "found {} faces", faces.len())?;
    Ok(faces)
  }

  /// 没有检测结果时返回空图，比对器会报告空哈希
  fn crop(&self, image: &DynamicImage, faces: &[FaceRect]) -> DynamicImage {
    match self.selection.select(faces) {
      Some(face) => face.crop(image),
      None => DynamicImage::new_rgb8(0, 0),
    }
  }

  fn annotate(
    &self,
    dir: &Path,
    images: [&DynamicImage; 2],
    faces: [&[FaceRect]; 2],
    crops: [&DynamicImage; 2],
  ) -> Result<(), FlowError> {
    std::fs::create_dir_all(dir)?;
    let draw = Draw::new().map_err(DisplayError::from)?;
    for (i, (image, faces)) in images.iter().zip(faces).enumerate() {
      let path = dir.join(format!("image{}.png", i + 1));
      draw
        .annotate(image, faces)
        .save(&path)
        .map_err(DisplayError::from)?;
      info!("已保存标注图: {}", path.display());
    }
    for (i, crop) in crops.iter().enumerate() {
      if crop.width() == 0 || crop.height() == 0 {
        continue;
      }
      let path = dir.join(format!("crop{}.png", i + 1));
      crop.to_rgb8().save(&path).map_err(DisplayError::from)?;
    }
    Ok(())
  }

  pub fn run<W: Write>(
    &mut self,
    images: [&DynamicImage; 2],
    out: &mut W,
  ) -> Result<Vec<Similarity>, FlowError> {
    let faces1 = self.detect(images[0], out)?;
    let faces2 = self.detect(images[1], out)?;
    let crop1 = self.crop(images[0], &faces1);
    let crop2 = self.crop(images[1], &faces2);

    if let Some(dir) = &self.annotate_dir {
      self.annotate(
        dir,
        images,
        [faces1.as_slice(), faces2.as_slice()],
        [&crop1, &crop2],
      )?;
    }

    Ok(self.comparator.compare([&crop1, &crop2], out)?)
  }
}

/// 完整的图片比对流程：先解码两张图，再加载分类器
pub fn image_pair_flow<W: Write>(
  image1: Option<&Path>,
  image2: Option<&Path>,
  classifier: Option<&Path>,
  options: &ImagePairOptions,
  out: &mut W,
) -> Result<Vec<Similarity>, FlowError> {
  let (Some(image1), Some(image2), Some(classifier)) = (image1, image2, classifier) else {
    return Err(FlowError::Usage(IMAGE_USAGE));
  };

  let image1 = decode(image1)?;
  let image2 = decode(image2)?;
  let classifier = load_classifier(classifier)?;

  ImagePairTask::new(classifier, options).run([&image1, &image2], out)
}

/// 不做检测，直接比对两张整图
pub fn compare_flow<W: Write>(
  image1: Option<&Path>,
  image2: Option<&Path>,
  options: &CompareOptions,
  out: &mut W,
) -> Result<Vec<Similarity>, FlowError> {
  let (Some(image1), Some(image2)) = (image1, image2) else {
    return Err(FlowError::Usage(COMPARE_USAGE));
  };
  let image1 = decode(image1)?;
  let image2 = decode(image2)?;
  Ok(FaceComparator::new(options).compare([&image1, &image2], out)?)
}

/// 非致命错误打印诊断信息后当作正常结束；致命错误继续向上返回
pub fn report<T, W: Write>(result: Result<T, FlowError>, out: &mut W) -> Result<Option<T>, FlowError> {
  match result {
    Ok(value) => Ok(Some(value)),
    Err(err) if err.is_fatal() => Err(err),
    Err(err) => {
      warn!("流程结束: {:?}", err);
      writeln!(out, "{}", err)?;
      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quit_signal_fires_once() {
    let (tx, quit) = QuitSignal::channel();
    assert!(!quit.requested());
    tx.send(()).unwrap();
    assert!(quit.requested());
    assert!(!quit.requested());
  }

  #[test]
  fn dropped_sender_never_quits() {
    let (tx, quit) = QuitSignal::channel();
    drop(tx);
    assert!(!quit.requested());
  }

  #[test]
  fn webcam_usage_without_arguments() {
    let mut out = Vec::new();
    let result = webcam_flow(None, None, &WebcamOptions::default(), &mut out);
    assert!(matches!(result, Err(FlowError::Usage(text)) if text == WEBCAM_USAGE));
    assert!(out.is_empty());
  }

  #[test]
  fn image_usage_with_two_arguments() {
    let mut out = Vec::new();
    let result = image_pair_flow(
      Some(Path::new("a.png")),
      Some(Path::new("b.png")),
      None,
      &ImagePairOptions::default(),
      &mut out,
    );
    assert!(matches!(result, Err(FlowError::Usage(text)) if text == IMAGE_USAGE));
  }

  #[test]
  fn report_prints_non_fatal() {
    let mut out = Vec::new();
    let reported = report::<(), _>(Err(FlowError::Usage(WEBCAM_USAGE)), &mut out).unwrap();
    assert!(reported.is_none());
    assert_eq!(
      String::from_utf8(out).unwrap(),
      "How to run:\n\tface-detect-webcam [camera ID] [classifier XML file]\n"
    );
  }

  #[test]
  fn report_propagates_decode() {
    let mut out = Vec::new();
    let err = FlowError::Decode {
      path: PathBuf::from("x.png"),
      source: image::ImageError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound)),
    };
    assert!(report::<(), _>(Err(err), &mut out).is_err());
    assert!(out.is_empty());
  }
}
