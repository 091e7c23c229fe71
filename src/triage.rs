// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/triage.rs - 单次分诊流程
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
use tracing::{debug, info};

use crate::{
  TriageResult,
  filter::DetectionFilter,
  model::Detector,
  output::{AnnotationRenderer, RenderError},
  profile::ProfileTable,
  scan::{ScanConfig, ScanError, ScanOutcome, ThresholdScanner},
};

#[derive(Error, Debug)]
pub enum TriageError {
  #[error("无法解码影像: {0}")]
  UnreadableImage(#[source] image::ImageError),
  #[error("阈值搜索失败: {0}")]
  Scan(#[from] ScanError),
  #[error("标注图像生成失败: {0}")]
  Render(#[from] RenderError),
}

/// 分诊流程: 解码 -> 阈值搜索 -> 标注 -> 组装结果
///
/// 不持有可变状态，检测器可共享时同一实例可在多个线程上并发处理请求。
pub struct Triage<'a, D> {
  detector: D,
  filter: DetectionFilter<'a>,
  scanner: ThresholdScanner,
  renderer: AnnotationRenderer,
}

impl<D: Detector> Triage<'static, D> {
  pub fn new(detector: D) -> Self {
    Self {
      detector,
      filter: DetectionFilter::default(),
      scanner: ThresholdScanner::default(),
      renderer: AnnotationRenderer::default(),
    }
  }
}

impl<'a, D: Detector> Triage<'a, D> {
  pub fn with_profiles<'b>(self, table: &'b ProfileTable) -> Triage<'b, D> {
    Triage {
      detector: self.detector,
      filter: DetectionFilter::new(table),
      scanner: self.scanner,
      renderer: self.renderer,
    }
  }

  pub fn with_scan_config(mut self, config: ScanConfig) -> Self {
    self.scanner = ThresholdScanner::new(config);
    self
  }

  pub fn with_renderer(mut self, renderer: AnnotationRenderer) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  /// 对一张编码后的影像执行分诊
  pub fn run(&self, bytes: &[u8]) -> Result<TriageResult, TriageError> {
    let image = decode_image(bytes)?;
    debug!("影像解码完成: {}x{}", image.width(), image.height());
    self.run_image(&image)
  }

  pub fn run_image(&self, image: &RgbImage) -> Result<TriageResult, TriageError> {
    match self.scanner.scan(&self.detector, image, &self.filter)? {
      ScanOutcome::Accepted {
        candidate,
        threshold,
        step,
      } => {
        let annotated = self.renderer.render(image, &candidate.bbox)?;
        info!(
          "检测到骨折: {} (阈值 {:.3}，第 {} 步)，预计恢复 {} 天",
          candidate.kind, threshold, step, candidate.recovery_days
        );
        Ok(TriageResult::positive(candidate, annotated))
      }
      ScanOutcome::Exhausted { steps } => {
        info!("{} 个阈值内未检测到有效骨折", steps);
        Ok(TriageResult::negative())
      }
    }
  }
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, TriageError> {
  image::load_from_memory(bytes)
    .map(|image| image.to_rgb8())
    .map_err(TriageError::UnreadableImage)
}
