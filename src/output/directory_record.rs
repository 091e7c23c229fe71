// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/output/directory_record.rs - 按日期归档分诊报告
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, TriageResult, decoded_path, input::InputImage, output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("报告序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 报告记录，标注图像以同名 `.jpg` 单独保存，记录中只引用文件名
#[derive(Serialize)]
struct Report<'a> {
  source: &'a str,
  created_at: String,
  detected: bool,
  #[serde(rename = "type")]
  kind: Option<&'a str>,
  recovery_time: Option<u32>,
  confidence: Option<f32>,
  image: Option<String>,
}

/// 报告目录输出
///
/// 每次分诊写入 `<目录>/YYYY/MM/DD/HH-MM-SS-XXXX.json`，检测到骨折时在同名
/// `.jpg` 中保存标注图像。默认只记录阳性结果，URL 带 `always` 查询参数时
/// 阴性结果也记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  report_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(decoded_path(uri)),
      report_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn report_id(&self) -> u16 {
    self.report_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn report_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.report_id()
    )))
  }
}

impl Render<InputImage, TriageResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, source: &InputImage, result: &TriageResult) -> Result<(), Self::Error> {
    if !self.always && !result.detected() {
      debug!("{} 为阴性结果，跳过记录", source.name);
      return Ok(());
    }

    let now = Utc::now();
    let path = self.report_path(&now)?;

    let mut image = None;
    if let Some(bytes) = result.annotated_image() {
      let image_path = path.with_extension("jpg");
      std::fs::write(&image_path, bytes)?;
      image = image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    }

    let report = Report {
      source: &source.name,
      created_at: now.to_rfc3339(),
      detected: result.detected(),
      kind: result.kind(),
      recovery_time: result.recovery_days(),
      confidence: result.confidence(),
      image,
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;

    info!("分诊报告已记录: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;
  use crate::{filter::Candidate, model::BoundingBox};

  fn source(name: &str) -> InputImage {
    InputImage {
      name: name.to_string(),
      bytes: Vec::new(),
    }
  }

  fn positive() -> TriageResult {
    let candidate = Candidate {
      kind: "forearm fracture".to_string(),
      recovery_days: 33,
      confidence: 0.42,
      bbox: BoundingBox::new(0, 0, 50, 50).unwrap(),
    };
    TriageResult::positive(candidate, vec![0xFF, 0xD8, 0xFF])
  }

  fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          pending.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn records_positive_results_with_image() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&source("negative.png"), &TriageResult::negative())
      .unwrap();
    output
      .render_result(&source("forearm.png"), &positive())
      .unwrap();

    let reports = files_with_extension(dir.path(), "json");
    assert_eq!(reports.len(), 1);
    let report: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&reports[0]).unwrap()).unwrap();
    assert_eq!(report["source"], "forearm.png");
    assert_eq!(report["detected"], true);
    assert_eq!(report["type"], "forearm fracture");
    assert_eq!(report["recovery_time"], 33);
    assert!(report["created_at"].is_string());

    assert!(report.get("image_base64").is_none());

    let images = files_with_extension(dir.path(), "jpg");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].with_extension("json"), reports[0]);
    assert_eq!(
      report["image"],
      images[0].file_name().unwrap().to_str().unwrap()
    );
    assert_eq!(std::fs::read(&images[0]).unwrap(), vec![0xFF, 0xD8, 0xFF]);
  }

  #[test]
  fn always_records_negative_results() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&source("a.png"), &TriageResult::negative())
      .unwrap();
    output
      .render_result(&source("b.png"), &TriageResult::negative())
      .unwrap();

    let reports = files_with_extension(dir.path(), "json");
    assert_eq!(reports.len(), 2);
    assert!(files_with_extension(dir.path(), "jpg").is_empty());
    let report: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&reports[0]).unwrap()).unwrap();
    assert_eq!(report["detected"], false);
    assert!(report["type"].is_null());
    assert!(report["image"].is_null());
  }
}
