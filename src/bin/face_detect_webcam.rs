// 该文件是 Mianxiang （面相） 项目的一部分。
// src/bin/face_detect_webcam.rs - 摄像头人脸检测
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use mianxiang::config::DetectorArgs;
use mianxiang::output::DEFAULT_DISPLAY;
use mianxiang::task::{WebcamOptions, report, webcam_flow};

/// 从摄像头读帧并标出人脸
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头编号，对应 /dev/video<ID>
  #[arg(value_name = "CAMERA_ID")]
  pub camera: Option<u32>,
  /// 级联分类器 XML 文件
  #[arg(value_name = "CLASSIFIER")]
  pub classifier: Option<PathBuf>,
  /// 显示输出，例如 folder:///tmp/frames、gst://window 或 null:
  #[arg(long, value_name = "URL", default_value = DEFAULT_DISPLAY)]
  pub display: Url,
  /// 处理指定帧数后退出
  #[arg(long, value_name = "N")]
  pub max_frames: Option<u64>,
  #[command(flatten)]
  pub detector: DetectorArgs,
}

fn main() -> Result<()> {
  mianxiang::init_tracing();

  let args = Args::parse();
  info!("启动参数: {:?}", args);

  let options = WebcamOptions {
    display: Some(args.display),
    params: args.detector.into(),
    max_frames: args.max_frames,
  };
  let mut stdout = std::io::stdout().lock();
  let result = webcam_flow(args.camera, args.classifier.as_deref(), &options, &mut stdout);
  if let Some(reason) = report(result, &mut stdout)? {
    info!("摄像头任务结束: {:?}", reason);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_defaults_to_compiled_backend() {
    let args = Args::try_parse_from(["face-detect-webcam", "0", "cascade.xml"]).unwrap();
    assert_eq!(args.display.as_str(), Url::parse(DEFAULT_DISPLAY).unwrap().as_str());

    let args =
      Args::try_parse_from(["face-detect-webcam", "--display", "null:", "0", "cascade.xml"]).unwrap();
    assert_eq!(args.display.scheme(), "null");
  }
}
