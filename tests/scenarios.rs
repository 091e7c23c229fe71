// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// tests/scenarios.rs - 分诊流程场景测试
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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fracture_triage::{
  Triage, TriageError,
  model::{BoundingBox, Detection, Detector, ReplayDetector},
  profile::{ProfileTable, RecoveryProfile},
  scan::{ScanConfig, ScanError},
};
use image::{ImageFormat, Rgb, RgbImage};

#[derive(Debug, thiserror::Error)]
#[error("推理后端不可用")]
struct BackendDown;

/// 每个阈值都返回同一批检测，并统计调用次数
struct FixedDetector {
  detections: Vec<Detection>,
  calls: AtomicUsize,
}

impl FixedDetector {
  fn new(detections: Vec<Detection>) -> Self {
    Self {
      detections,
      calls: AtomicUsize::new(0),
    }
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Detector for FixedDetector {
  type Error = BackendDown;

  fn infer(&self, _image: &RgbImage, _threshold: f32) -> Result<Vec<Detection>, BackendDown> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.detections.clone())
  }
}

struct FailingDetector;

impl Detector for FailingDetector {
  type Error = BackendDown;

  fn infer(&self, _image: &RgbImage, _threshold: f32) -> Result<Vec<Detection>, BackendDown> {
    Err(BackendDown)
  }
}

fn detection(label: &str, bbox: BoundingBox, confidence: f32) -> Detection {
  Detection {
    bbox,
    label: label.to_string(),
    confidence,
  }
}

fn radiograph() -> Vec<u8> {
  let image = RgbImage::from_fn(64, 64, |x, y| {
    let v = ((x + y) * 2) as u8;
    Rgb([v, v, v])
  });
  let mut bytes = Vec::new();
  image
    .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

#[test]
fn scenario_a_no_detections() {
  let triage = Triage::new(FixedDetector::new(Vec::new()));
  let result = triage.run(&radiograph()).unwrap();

  assert!(!result.detected());
  assert_eq!(result.kind(), None);
  assert_eq!(result.recovery_days(), None);
  assert_eq!(result.confidence(), None);
  assert_eq!(result.annotated_image(), None);
  assert_eq!(triage.detector().calls(), 30);
}

#[test]
fn scenario_b_borderline_wrist_is_rejected_everywhere() {
  // 面积 100 = 10 x 10，恢复期估计 10 天 = 最小值
  let bbox = BoundingBox::new(5, 5, 15, 15).unwrap();
  let triage = Triage::new(FixedDetector::new(vec![detection("wrist-positive", bbox, 0.6)]));
  let result = triage.run(&radiograph()).unwrap();

  assert!(!result.detected());
  assert_eq!(result.recovery_days(), None);
  assert_eq!(triage.detector().calls(), 30);
}

#[test]
fn scenario_c_elbow_is_accepted_on_first_threshold() {
  // 面积 2100 = 42 x 50
  let bbox = BoundingBox::new(10, 5, 52, 55).unwrap();
  let triage = Triage::new(FixedDetector::new(vec![detection("elbow-positive", bbox, 0.31)]));
  let result = triage.run(&radiograph()).unwrap();

  assert!(result.detected());
  assert_eq!(result.kind(), Some("elbow-positive"));
  assert_eq!(result.recovery_days(), Some(30));
  assert_eq!(result.confidence(), Some(0.31));
  assert_eq!(triage.detector().calls(), 1);

  let annotated = image::load_from_memory(result.annotated_image().unwrap())
    .unwrap()
    .to_rgb8();
  assert_eq!(annotated.dimensions(), (64, 64));
  assert!(result.image_base64().is_some_and(|b64| !b64.is_empty()));
}

#[test]
fn scenario_d_unknown_label_is_never_accepted() {
  let bbox = BoundingBox::new(0, 0, 40, 40).unwrap();
  let triage = Triage::new(FixedDetector::new(vec![detection("implant", bbox, 0.9)]));
  let result = triage.run(&radiograph()).unwrap();

  assert!(!result.detected());
  assert_eq!(triage.detector().calls(), 30);
}

#[test]
fn scenario_e_every_negative_request_walks_the_full_schedule() {
  let triage = Triage::new(FixedDetector::new(Vec::new()));
  for _ in 0..3 {
    triage.run(&radiograph()).unwrap();
  }
  assert_eq!(triage.detector().calls(), 90);
}

#[test]
fn repeated_scans_are_deterministic() {
  let bboxes = [
    ("implant", BoundingBox::new(0, 0, 30, 30).unwrap(), 0.8),
    ("wrist positive", BoundingBox::new(0, 0, 10, 10).unwrap(), 0.7),
    ("forearm fracture", BoundingBox::new(4, 4, 60, 60).unwrap(), 0.4),
  ];
  let detections = bboxes
    .iter()
    .map(|&(label, bbox, confidence)| detection(label, bbox, confidence))
    .collect();
  let triage = Triage::new(FixedDetector::new(detections));
  let bytes = radiograph();

  let first = triage.run(&bytes).unwrap();
  let second = triage.run(&bytes).unwrap();
  assert_eq!(first, second);
  assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
  // 56 x 56 = 3136: 25 + (3136 - 300) / 5700 * 20 = 34.95 -> 35
  assert_eq!(first.recovery_days(), Some(35));
  assert_eq!(first.kind(), Some("forearm fracture"));
}

#[test]
fn shared_triage_serves_concurrent_requests() {
  let bbox = BoundingBox::new(10, 5, 52, 55).unwrap();
  let triage = Triage::new(FixedDetector::new(vec![detection("elbow positive", bbox, 0.5)]));
  let bytes = radiograph();

  let results: Vec<_> = std::thread::scope(|scope| {
    let handles: Vec<_> = (0..4)
      .map(|_| scope.spawn(|| triage.run(&bytes).unwrap()))
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  assert!(results.windows(2).all(|w| w[0] == w[1]));
  assert_eq!(triage.detector().calls(), 4);
}

#[test]
fn detector_failure_fails_the_request() {
  let triage = Triage::new(FailingDetector);
  let err = triage.run(&radiograph()).unwrap_err();
  assert!(matches!(
    err,
    TriageError::Scan(ScanError::Detector { .. })
  ));
}

#[test]
fn deadline_is_reported_as_failure() {
  struct SlowDetector;

  impl Detector for SlowDetector {
    type Error = BackendDown;

    fn infer(&self, _image: &RgbImage, _threshold: f32) -> Result<Vec<Detection>, BackendDown> {
      std::thread::sleep(Duration::from_millis(3));
      Ok(Vec::new())
    }
  }

  let triage = Triage::new(SlowDetector).with_scan_config(ScanConfig {
    deadline: Some(Duration::from_millis(10)),
    ..ScanConfig::default()
  });
  let err = triage.run(&radiograph()).unwrap_err();
  assert!(matches!(
    err,
    TriageError::Scan(ScanError::DeadlineExceeded { .. })
  ));
}

#[test]
fn custom_profile_table_is_honoured() {
  let table = ProfileTable::from_entries([(
    "ankle fracture",
    RecoveryProfile::new(100, 1100, 40, 60).unwrap(),
  )])
  .unwrap();
  let bbox = BoundingBox::new(0, 0, 30, 20).unwrap();
  let triage = Triage::new(FixedDetector::new(vec![
    detection("elbow positive", BoundingBox::new(0, 0, 42, 50).unwrap(), 0.9),
    detection("ankle-fracture", bbox, 0.2),
  ]))
  .with_profiles(&table);

  let result = triage.run(&radiograph()).unwrap();
  // 600: 40 + 500 / 1000 * 20 = 50
  assert_eq!(result.kind(), Some("ankle-fracture"));
  assert_eq!(result.recovery_days(), Some(50));
}

#[test]
fn boxes_far_outside_the_image_are_still_annotated() {
  let detector = ReplayDetector::from_json_str(
    r#"[{"bbox": [-1.5e9, 0, 1.5e9, 20], "label": "elbow positive", "confidence": 0.9}]"#,
  )
  .unwrap();
  let result = Triage::new(detector).run(&radiograph()).unwrap();

  assert!(result.detected());
  // 面积远超 area_max，取最大恢复期
  assert_eq!(result.recovery_days(), Some(40));
  let annotated = image::load_from_memory(result.annotated_image().unwrap())
    .unwrap()
    .to_rgb8();
  let top = annotated.get_pixel(32, 0);
  assert!(top[1] > 150 && top[1] > top[0], "{top:?}");
}
