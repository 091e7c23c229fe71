// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/model.rs - 检测器接口与检测结果
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
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 目标检测器
///
/// 对给定图像和置信度阈值返回有序的检测列表。空列表是合法结果，
/// 推理失败必须以 `Err` 返回，不能伪装成空列表。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, Self::Error>;
}

/// 像素坐标的检测框，保证 xmin < xmax 且 ymin < ymax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
  xmin: i32,
  ymin: i32,
  xmax: i32,
  ymax: i32,
}

impl BoundingBox {
  pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Option<Self> {
    if xmin >= xmax || ymin >= ymax {
      return None;
    }
    Some(Self {
      xmin,
      ymin,
      xmax,
      ymax,
    })
  }

  /// 由浮点坐标 [x_min, y_min, x_max, y_max] 构造，坐标向零截断而非四舍五入
  pub fn from_xyxy(bbox: [f32; 4]) -> Option<Self> {
    Self::new(
      bbox[0] as i32,
      bbox[1] as i32,
      bbox[2] as i32,
      bbox[3] as i32,
    )
  }

  pub fn xmin(&self) -> i32 {
    self.xmin
  }

  pub fn ymin(&self) -> i32 {
    self.ymin
  }

  pub fn xmax(&self) -> i32 {
    self.xmax
  }

  pub fn ymax(&self) -> i32 {
    self.ymax
  }

  pub fn width(&self) -> u32 {
    self.xmax.abs_diff(self.xmin)
  }

  pub fn height(&self) -> u32 {
    self.ymax.abs_diff(self.ymin)
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub label: String,
  pub confidence: f32,
}

mod replay;
pub use self::replay::{ReplayDetector, ReplayError};

#[cfg(feature = "model_rknn")]
mod yolo;
#[cfg(feature = "model_rknn")]
pub use self::yolo::{FRACTURE_CLASSES, FractureYolo, FractureYoloBuilder, FractureYoloError};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("回放检测器错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_rknn")]
  #[error("RKNN YOLO 检测器错误: {0}")]
  FractureYoloError(#[from] FractureYoloError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的检测器
pub enum DetectorWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_rknn")]
  FractureYolo(FractureYolo),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayDetector::SCHEME => Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?)),
      #[cfg(feature = "model_rknn")]
      FractureYoloBuilder::SCHEME => {
        let model = FractureYoloBuilder::from_url(url)?.build()?;
        Ok(DetectorWrapper::FractureYolo(model))
      }
      scheme => Err(DetectorError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Detector for DetectorWrapper {
  type Error = DetectorError;

  fn infer(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    match self {
      DetectorWrapper::Replay(detector) => detector
        .infer(image, confidence_threshold)
        .map_err(DetectorError::from),
      #[cfg(feature = "model_rknn")]
      DetectorWrapper::FractureYolo(detector) => detector
        .infer(image, confidence_threshold)
        .map_err(DetectorError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bbox_truncates_coordinates() {
    let bbox = BoundingBox::from_xyxy([10.9, 20.2, 50.99, 60.5]).unwrap();
    assert_eq!(
      (bbox.xmin(), bbox.ymin(), bbox.xmax(), bbox.ymax()),
      (10, 20, 50, 60)
    );
    assert_eq!(bbox.width(), 40);
    assert_eq!(bbox.height(), 40);
    assert_eq!(bbox.area(), 1600);
  }

  #[test]
  fn bbox_rejects_degenerate_boxes() {
    assert!(BoundingBox::new(5, 5, 5, 10).is_none());
    assert!(BoundingBox::new(5, 10, 8, 2).is_none());
    // 截断后宽度为零
    assert!(BoundingBox::from_xyxy([3.2, 1.0, 3.9, 8.0]).is_none());
  }

  #[test]
  fn bbox_area_does_not_overflow() {
    let bbox = BoundingBox::new(0, 0, 100_000, 100_000).unwrap();
    assert_eq!(bbox.area(), 10_000_000_000);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("onnx:///tmp/model.onnx").unwrap();
    match DetectorWrapper::from_url(&url) {
      Err(DetectorError::SchemeMismatch(scheme)) => assert_eq!(scheme, "onnx"),
      _ => panic!("expected scheme mismatch"),
    }
  }
}
