// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/result.rs - 分诊结果
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

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Serialize, Serializer};

use crate::filter::Candidate;

/// 单次分诊的输出，构造后不再修改
///
/// 序列化字段: `detected`, `type`, `recovery_time`, `confidence`,
/// `image_base64`，缺省值显式输出为 `null`。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageResult {
  detected: bool,
  #[serde(rename = "type")]
  kind: Option<String>,
  #[serde(rename = "recovery_time")]
  recovery_days: Option<u32>,
  confidence: Option<f32>,
  #[serde(rename = "image_base64", serialize_with = "serialize_base64")]
  annotated_image: Option<Vec<u8>>,
}

impl TriageResult {
  /// 阈值搜索结束仍无有效检测
  pub fn negative() -> Self {
    Self {
      detected: false,
      kind: None,
      recovery_days: None,
      confidence: None,
      annotated_image: None,
    }
  }

  pub fn positive(candidate: Candidate, annotated_image: Vec<u8>) -> Self {
    Self {
      detected: true,
      kind: Some(candidate.kind),
      recovery_days: Some(candidate.recovery_days),
      confidence: Some(candidate.confidence),
      annotated_image: Some(annotated_image),
    }
  }

  pub fn detected(&self) -> bool {
    self.detected
  }

  pub fn kind(&self) -> Option<&str> {
    self.kind.as_deref()
  }

  pub fn recovery_days(&self) -> Option<u32> {
    self.recovery_days
  }

  pub fn confidence(&self) -> Option<f32> {
    self.confidence
  }

  /// 标注后的 JPEG 数据
  pub fn annotated_image(&self) -> Option<&[u8]> {
    self.annotated_image.as_deref()
  }

  pub fn image_base64(&self) -> Option<String> {
    self.annotated_image.as_ref().map(|bytes| STANDARD.encode(bytes))
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }
}

fn serialize_base64<S: Serializer>(
  bytes: &Option<Vec<u8>>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  match bytes {
    Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
    None => serializer.serialize_none(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;
  use serde_json::json;

  #[test]
  fn negative_serializes_explicit_nulls() {
    let value = serde_json::to_value(TriageResult::negative()).unwrap();
    assert_eq!(
      value,
      json!({
        "detected": false,
        "type": null,
        "recovery_time": null,
        "confidence": null,
        "image_base64": null,
      })
    );
  }

  #[test]
  fn positive_serializes_base64_image() {
    let candidate = Candidate {
      kind: "elbow positive".to_string(),
      recovery_days: 30,
      confidence: 0.5,
      bbox: BoundingBox::new(0, 0, 42, 50).unwrap(),
    };
    let result = TriageResult::positive(candidate, b"jpeg".to_vec());

    assert!(result.detected());
    assert_eq!(result.kind(), Some("elbow positive"));
    assert_eq!(result.recovery_days(), Some(30));
    assert_eq!(result.image_base64().as_deref(), Some("anBlZw=="));

    let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(
      value,
      json!({
        "detected": true,
        "type": "elbow positive",
        "recovery_time": 30,
        "confidence": 0.5,
        "image_base64": "anBlZw==",
      })
    );
  }
}
