// 该文件是 Mianxiang （面相） 项目的一部分。
// src/bin/face_compare.rs - 两张图片的感知哈希比对
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

use mianxiang::config::CompareOptions;
use mianxiang::task::{compare_flow, report};

/// 不做检测，直接比对两张图
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[arg(value_name = "IMAGE1")]
  pub image1: Option<PathBuf>,
  #[arg(value_name = "IMAGE2")]
  pub image2: Option<PathBuf>,
  #[command(flatten)]
  pub compare: CompareOptions,
}

fn main() -> Result<()> {
  mianxiang::init_tracing();

  let args = Args::parse();
  info!("启动参数: {:?}", args);

  let mut stdout = std::io::stdout().lock();
  let result = compare_flow(
    args.image1.as_deref(),
    args.image2.as_deref(),
    &args.compare,
    &mut stdout,
  );
  if let Some(similarities) = report(result, &mut stdout)? {
    info!("完成 {} 项比对", similarities.len());
  }
  Ok(())
}
