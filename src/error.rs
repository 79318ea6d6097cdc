// 该文件是 Mianxiang （面相） 项目的一部分。
// src/error.rs - 流程级错误
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

use thiserror::Error;

use crate::cascade::CascadeError;
use crate::compare::CompareError;
use crate::hash::HashError;
use crate::output::DisplayError;

/// 面向操作者的错误，`Display` 的文本即打印到 stdout 的诊断信息
#[derive(Error, Debug)]
pub enum FlowError {
  #[error("{0}")]
  Usage(&'static str),
  #[error("cannot read device {id}")]
  Device { id: u32, reason: String },
  #[error("Error reading cascade file: {}", path.display())]
  ClassifierLoad {
    path: PathBuf,
    #[source]
    source: CascadeError,
  },
  #[error("Can not read Image file : {}", path.display())]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("error computing hash for {algorithm}")]
  EmptyHash { algorithm: &'static str },
  #[error("detection failed: {0}")]
  Detection(#[from] CascadeError),
  #[error("display failed: {0}")]
  Display(#[from] DisplayError),
  #[error("hash comparison failed: {0}")]
  Hash(#[from] HashError),
  #[error("output failed: {0}")]
  Io(#[from] std::io::Error),
}

impl From<CompareError> for FlowError {
  fn from(err: CompareError) -> Self {
    match err {
      CompareError::EmptyHash { algorithm } => FlowError::EmptyHash { algorithm },
      CompareError::Hash(e) => FlowError::Hash(e),
      CompareError::Io(e) => FlowError::Io(e),
    }
  }
}

impl FlowError {
  /// 只有图片解码失败会让进程以非零状态退出
  pub fn is_fatal(&self) -> bool {
    matches!(self, FlowError::Decode { .. })
  }
}
