// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// tests/tasks.rs - 分诊任务端到端测试
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

use std::path::{Path, PathBuf};

use fracture_triage::{
  FromUrl, Triage,
  input::InputWrapper,
  model::{BoundingBox, Detection, ReplayDetector},
  output::OutputWrapper,
  task::{BatchTask, OneShotTask, Task, TaskSummary},
};
use image::{ImageFormat, Rgb, RgbImage};
use url::Url;

fn write_png(path: &Path) {
  RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]))
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

fn url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

fn elbow_detector() -> ReplayDetector {
  ReplayDetector::from_detections(vec![Detection {
    bbox: BoundingBox::new(2, 2, 44, 42).unwrap(),
    label: "elbow positive".to_string(),
    confidence: 0.7,
  }])
}

fn files_with_extension(root: &Path, extension: &str) -> Vec<PathBuf> {
  let mut found = Vec::new();
  let mut pending = vec![root.to_path_buf()];
  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        pending.push(path);
      } else if path.extension().is_some_and(|e| e == extension) {
        found.push(path);
      }
    }
  }
  found
}

#[test]
fn batch_task_records_positive_reports_and_skips_broken_images() {
  let xrays = tempfile::tempdir().unwrap();
  let reports = tempfile::tempdir().unwrap();
  write_png(&xrays.path().join("a.png"));
  write_png(&xrays.path().join("b.png"));
  std::fs::write(xrays.path().join("c.png"), b"not a png").unwrap();
  std::fs::write(xrays.path().join("notes.txt"), b"ignored").unwrap();

  let input = InputWrapper::from_url(&url("folder", xrays.path())).unwrap();
  let output = Some(OutputWrapper::from_url(&url("folder", reports.path())).unwrap());
  let triage = Triage::new(elbow_detector());

  let summary = BatchTask::default().run_task(input, &triage, output).unwrap();
  assert_eq!(
    summary,
    TaskSummary {
      detected: 2,
      negative: 0,
      failed: 1,
    }
  );
  assert_eq!(summary.total(), 3);

  let json = files_with_extension(reports.path(), "json");
  assert_eq!(json.len(), 2);
  assert_eq!(files_with_extension(reports.path(), "jpg").len(), 2);

  let report: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&json[0]).unwrap()).unwrap();
  assert_eq!(report["detected"], true);
  assert_eq!(report["type"], "elbow positive");
  assert!(report["recovery_time"].as_u64().is_some());
}

#[test]
fn batch_task_stops_at_max_images() {
  let xrays = tempfile::tempdir().unwrap();
  for name in ["1.png", "2.png", "3.png"] {
    write_png(&xrays.path().join(name));
  }

  let input = InputWrapper::from_url(&url("folder", xrays.path())).unwrap();
  let triage = Triage::new(ReplayDetector::from_detections(Vec::new()));

  let summary = BatchTask::default()
    .with_max_images(Some(2))
    .run_task(input, &triage, None::<OutputWrapper>)
    .unwrap();
  assert_eq!(summary.negative, 2);
  assert_eq!(summary.total(), 2);
}

#[test]
fn oneshot_task_saves_annotated_image() {
  let dir = tempfile::tempdir().unwrap();
  let xray = dir.path().join("xray.png");
  let annotated = dir.path().join("annotated.jpg");
  write_png(&xray);

  let input = InputWrapper::from_url(&url("image", &xray)).unwrap();
  let output = Some(OutputWrapper::from_url(&url("image", &annotated)).unwrap());
  let triage = Triage::new(elbow_detector());

  let summary = OneShotTask.run_task(input, &triage, output).unwrap();
  assert_eq!(summary.detected, 1);

  let saved = image::open(&annotated).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (64, 48));
}

#[test]
fn oneshot_task_fails_on_undecodable_image() {
  let dir = tempfile::tempdir().unwrap();
  let xray = dir.path().join("broken.png");
  std::fs::write(&xray, b"garbage").unwrap();

  let input = InputWrapper::from_url(&url("image", &xray)).unwrap();
  let triage = Triage::new(elbow_detector());

  assert!(
    OneShotTask
      .run_task(input, &triage, None::<OutputWrapper>)
      .is_err()
  );
}
