// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/input/read_image_file.rs - 单个影像文件输入
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

use std::path::Path;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path, input::InputImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 读取单个影像文件，只产出一次
pub struct ImageFileInput {
  image: Option<InputImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = decoded_path(url);
    let image = Self::read(Path::new(&path))?;

    Ok(ImageFileInput { image: Some(image) })
  }
}

impl ImageFileInput {
  pub(crate) fn read(path: &Path) -> Result<InputImage, std::io::Error> {
    let bytes = std::fs::read(path)?;
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());

    Ok(InputImage { name, bytes })
  }
}

impl Iterator for ImageFileInput {
  type Item = InputImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
