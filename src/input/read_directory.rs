// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/input/read_directory.rs - 影像目录输入
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
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  input::{ImageFileInput, InputImage},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("读取 {path} 失败: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 按文件名顺序读取目录下的所有影像文件（不递归）
pub struct DirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let directory = PathBuf::from(decoded_path(url));
    let io_error = |source: std::io::Error| DirectoryInputError::IoError {
      path: directory.clone(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
      if path.is_file() && is_image {
        files.push(path);
      } else {
        debug!("跳过非影像文件: {}", path.display());
      }
    }
    files.sort();

    info!("目录 {} 中共 {} 个影像文件", directory.display(), files.len());
    Ok(DirectoryInput {
      files: files.into_iter(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<InputImage, DirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    Some(
      ImageFileInput::read(&path).map_err(|source| DirectoryInputError::IoError { path, source }),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lists_images_sorted_by_name() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg"] {
      std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let names: Vec<String> = DirectoryInput::from_url(&url)
      .unwrap()
      .map(|image| image.unwrap().name)
      .collect();

    assert_eq!(names, ["a.jpg", "b.PNG", "c.jpeg"]);
  }

  #[test]
  fn missing_directory_is_error() {
    let url = Url::parse("folder:///definitely/not/here").unwrap();
    assert!(matches!(
      DirectoryInput::from_url(&url),
      Err(DirectoryInputError::IoError { .. })
    ));
  }
}
