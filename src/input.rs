// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/input.rs - 影像输入
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

use crate::{FromUrl, FromUrlWithScheme};

/// 一张待分诊的影像，保留原始编码数据，解码在分诊请求内进行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
  pub name: String,
  pub bytes: Vec<u8>,
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod read_directory;
pub use self::read_directory::{DirectoryInput, DirectoryInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Directory input error: {0}")]
  DirectoryInputError(#[from] DirectoryInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ReadDirectory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      DirectoryInput::SCHEME => Ok(InputWrapper::ReadDirectory(DirectoryInput::from_url(url)?)),
      scheme => Err(InputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<InputImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next().map(Ok),
      InputWrapper::ReadDirectory(input) => input.next().map(|item| item.map_err(InputError::from)),
    }
  }
}
