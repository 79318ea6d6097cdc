// 该文件是 Mianxiang （面相） 项目的一部分。
// src/config.rs - 命令行配置
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

use clap::{Args, ValueEnum};

use crate::cascade::DetectParams;
use crate::frame::FaceRect;

/// 哈希算法选择开关，启动时构造一次，之后只读
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashFlags {
  /// 计算全部哈希
  #[arg(long)]
  pub all: bool,
  /// 计算 PHash
  #[arg(long)]
  pub phash: bool,
  /// 计算 AverageHash
  #[arg(long)]
  pub average: bool,
  /// 计算 BlockMeanHash mode 0
  #[arg(long)]
  pub blockmean0: bool,
  /// 计算 BlockMeanHash mode 1
  #[arg(long)]
  pub blockmean1: bool,
  /// 计算 ColorMomentHash
  #[arg(long)]
  pub colormoment: bool,
  /// 计算 MarrHildrethHash
  #[arg(long)]
  pub marrhildreth: bool,
  /// 计算 RadialVarianceHash
  #[arg(long)]
  pub radialvariance: bool,
}

impl HashFlags {
  pub fn all() -> Self {
    Self {
      all: true,
      ..Self::default()
    }
  }

  pub fn with_all(self) -> Self {
    Self { all: true, ..self }
  }

  pub fn any(&self) -> bool {
    self.all
      || self.phash
      || self.average
      || self.blockmean0
      || self.blockmean1
      || self.colormoment
      || self.marrhildreth
      || self.radialvariance
  }
}

/// 比对器选项
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct CompareOptions {
  #[command(flatten)]
  pub flags: HashFlags,
  /// 打印每张图的哈希值（十六进制）
  #[arg(long = "print")]
  pub print_hashes: bool,
}

/// 级联检测参数
#[derive(Args, Debug, Clone, Copy)]
pub struct DetectorArgs {
  /// 金字塔缩放系数（> 1）
  #[arg(long, default_value_t = 1.1, value_name = "FACTOR")]
  pub scale_factor: f64,
  /// 保留一个候选框所需的最少邻居数
  #[arg(long, default_value_t = 3, value_name = "COUNT")]
  pub min_neighbors: u32,
  /// 最小检测窗口，格式 WxH
  #[arg(long, value_parser = parse_size, value_name = "WxH")]
  pub min_size: Option<(u32, u32)>,
  /// 最大检测窗口，格式 WxH
  #[arg(long, value_parser = parse_size, value_name = "WxH")]
  pub max_size: Option<(u32, u32)>,
}

impl Default for DetectorArgs {
  fn default() -> Self {
    let params = DetectParams::default();
    Self {
      scale_factor: params.scale_factor,
      min_neighbors: params.min_neighbors,
      min_size: params.min_size,
      max_size: params.max_size,
    }
  }
}

impl From<DetectorArgs> for DetectParams {
  fn from(args: DetectorArgs) -> Self {
    DetectParams {
      scale_factor: args.scale_factor,
      min_neighbors: args.min_neighbors,
      min_size: args.min_size,
      max_size: args.max_size,
    }
  }
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
  let (w, h) = value
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("尺寸格式应为 WxH: {}", value))?;
  let w = w
    .trim()
    .parse::<u32>()
    .map_err(|e| format!("无效宽度 '{}': {}", w, e))?;
  let h = h
    .trim()
    .parse::<u32>()
    .map_err(|e| format!("无效高度 '{}': {}", h, e))?;
  Ok((w, h))
}

/// 一张图检测到多张脸时，选哪一张去比对
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaceSelection {
  /// 面积最大的检测框
  #[default]
  Largest,
  /// 检测结果中的第一个
  First,
  /// 检测结果中的最后一个
  Last,
}

impl FaceSelection {
  pub fn select(&self, rects: &[FaceRect]) -> Option<FaceRect> {
    match self {
      FaceSelection::First => rects.first().copied(),
      FaceSelection::Last => rects.last().copied(),
      // 面积相同取靠前的
      FaceSelection::Largest => rects
        .iter()
        .copied()
        .fold(None, |best: Option<FaceRect>, r| match best {
          Some(b) if b.area() >= r.area() => Some(b),
          _ => Some(r),
        }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_size_accepts_both_separators() {
    assert_eq!(parse_size("30x40"), Ok((30, 40)));
    assert_eq!(parse_size("30X40"), Ok((30, 40)));
    assert!(parse_size("30").is_err());
    assert!(parse_size("ax3").is_err());
  }

  #[test]
  fn no_flag_means_nothing_selected() {
    assert!(!HashFlags::default().any());
    assert!(HashFlags::all().any());
    let flags = HashFlags {
      colormoment: true,
      ..HashFlags::default()
    };
    assert!(flags.any());
  }

  #[test]
  fn selection_strategies() {
    let rects = [
      FaceRect::new(0, 0, 10, 10),
      FaceRect::new(5, 5, 30, 30),
      FaceRect::new(9, 9, 20, 20),
    ];
    assert_eq!(FaceSelection::First.select(&rects), Some(rects[0]));
    assert_eq!(FaceSelection::Last.select(&rects), Some(rects[2]));
    assert_eq!(FaceSelection::Largest.select(&rects), Some(rects[1]));
    assert_eq!(FaceSelection::Largest.select(&[]), None);
  }

  #[test]
  fn largest_prefers_earlier_on_tie() {
    let rects = [FaceRect::new(0, 0, 10, 10), FaceRect::new(50, 50, 10, 10)];
    assert_eq!(FaceSelection::Largest.select(&rects), Some(rects[0]));
  }

  #[test]
  fn detector_args_default_matches_params() {
    let params: DetectParams = DetectorArgs::default().into();
    assert_eq!(params, DetectParams::default());
  }
}
