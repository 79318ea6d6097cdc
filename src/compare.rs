// 该文件是 Mianxiang （面相） 项目的一部分。
// src/compare.rs - 人脸比对
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

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CompareOptions;
use crate::hash::{HashAlgorithm, HashError, HashKind, HashResult, ImgHashBase, setup_hashes};

#[derive(Error, Debug)]
pub enum CompareError {
  #[error("error computing hash for {algorithm}")]
  EmptyHash { algorithm: &'static str },
  #[error(transparent)]
  Hash(#[from] HashError),
  #[error("写出比对结果失败: {0}")]
  Io(#[from] std::io::Error),
}

/// 按 Go `%g` 的规则输出分数：有效数字取能还原该值的最少位数，
/// 十进制指数小于 -4 或不小于 6 时改用 `d.ddde±XX` 形式
pub fn format_score(score: f64) -> String {
  if score.is_nan() {
    return "NaN".to_string();
  }
  if score.is_infinite() {
    return if score > 0.0 { "+Inf" } else { "-Inf" }.to_string();
  }
  if score == 0.0 {
    return if score.is_sign_negative() { "-0" } else { "0" }.to_string();
  }

  let sci = format!("{:e}", score);
  let Some((mantissa, exp)) = sci.split_once('e') else {
    return format!("{}", score);
  };
  let exp: i32 = match exp.parse() {
    Ok(exp) => exp,
    Err(_) => return format!("{}", score),
  };
  if (-4..6).contains(&exp) {
    format!("{}", score)
  } else {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.abs())
  }
}

/// 一个算法对两张图的比对结果
#[derive(Debug, Clone)]
pub struct Similarity {
  pub algorithm: HashKind,
  pub score: f64,
  pub hashes: [HashResult; 2],
}

/// 对两张图依次运行选中的哈希算法，逐行写出分数
#[derive(Debug, Clone)]
pub struct FaceComparator {
  hashes: Vec<HashAlgorithm>,
  print_hashes: bool,
}

impl FaceComparator {
  pub fn new(options: &CompareOptions) -> Self {
    Self {
      hashes: setup_hashes(&options.flags),
      print_hashes: options.print_hashes,
    }
  }

  pub fn algorithms(&self) -> &[HashAlgorithm] {
    &self.hashes
  }

  /// 任一算法得到空哈希时立即停止，之前写出的行保留
  pub fn compare<W: Write>(
    &self,
    images: [&DynamicImage; 2],
    out: &mut W,
  ) -> Result<Vec<Similarity>, CompareError> {
    let mut results = Vec::with_capacity(self.hashes.len());
    for hash in &self.hashes {
      let [a, b] = images.map(|image| hash.compute(image));
      if a.is_empty() || b.is_empty() {
        warn!("{} 的哈希为空，停止比对", hash.kind());
        return Err(CompareError::EmptyHash {
          algorithm: hash.name(),
        });
      }

      let score = hash.compare(&a, &b)?;
      debug!("{}: {}", hash.kind(), score);
      writeln!(out, "{}: similarity {}", hash.name(), format_score(score))?;
      if self.print_hashes {
        writeln!(out, "{}", a.to_hex())?;
        writeln!(out, "{}", b.to_hex())?;
      }

      results.push(Similarity {
        algorithm: hash.kind(),
        score,
        hashes: [a, b],
      });
    }
    Ok(results)
  }
}
