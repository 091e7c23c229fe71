// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/model/replay.rs - 回放已记录的检测输出
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

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  model::{BoundingBox, Detection, Detector},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: String, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("检测记录解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {index} 条检测的置信度无效: {confidence}")]
  InvalidConfidence { index: usize, confidence: f32 },
}

#[derive(Debug, Deserialize)]
struct RecordedDetection {
  bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
  label: String,
  confidence: f32,
}

/// 回放检测器
///
/// 读取一份已记录的检测输出（JSON 数组），每次推理返回置信度不低于阈值的记录，
/// 保持记录顺序，与输入图像内容无关。
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
  detections: Vec<Detection>,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        found: url.scheme().to_string(),
      });
    }

    let path = decoded_path(url);
    info!("加载检测记录: {}", path);
    let content = std::fs::read_to_string(&path)?;
    Self::from_json_str(&content)
  }
}

impl ReplayDetector {
  pub fn from_detections(detections: Vec<Detection>) -> Self {
    Self { detections }
  }

  pub fn from_json_str(content: &str) -> Result<Self, ReplayError> {
    let records: Vec<RecordedDetection> = serde_json::from_str(content)?;

    let mut detections = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
      if !(0.0..=1.0).contains(&record.confidence) {
        return Err(ReplayError::InvalidConfidence {
          index,
          confidence: record.confidence,
        });
      }
      match BoundingBox::from_xyxy(record.bbox) {
        Some(bbox) => detections.push(Detection {
          bbox,
          label: record.label,
          confidence: record.confidence,
        }),
        None => warn!("第 {} 条检测框退化，已丢弃: {:?}", index, record.bbox),
      }
    }

    debug!("检测记录共 {} 条", detections.len());
    Ok(Self { detections })
  }

  pub fn detections(&self) -> &[Detection] {
    &self.detections
  }
}

impl Detector for ReplayDetector {
  type Error = ReplayError;

  fn infer(
    &self,
    _image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    Ok(
      self
        .detections
        .iter()
        .filter(|det| det.confidence >= confidence_threshold)
        .cloned()
        .collect(),
    )
  }
}
