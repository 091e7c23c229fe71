// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/scan.rs - 置信度阈值递减搜索
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

use std::time::{Duration, Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  filter::{Candidate, DetectionFilter, Rejection, Verdict},
  model::Detector,
};

const DEFAULT_THRESHOLD_START: f32 = 0.30;
const DEFAULT_THRESHOLD_STEP: f32 = 0.01;
const DEFAULT_THRESHOLD_FLOOR: f32 = 0.002;
// 步数计算时吸收浮点表示误差，避免 (start - floor) / step 恰为整数时少算一步
const STEP_COUNT_EPSILON: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("阈值序列无效: {0}")]
  InvalidSchedule(String),
  #[error("检测器在阈值 {threshold:.3} 推理失败: {source}")]
  Detector {
    threshold: f32,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("阈值搜索超时: 已耗时 {elapsed:.2?}，限制 {deadline:.2?}，完成 {steps} 步")]
  DeadlineExceeded {
    elapsed: Duration,
    deadline: Duration,
    steps: usize,
  },
}

/// 严格递减的置信度阈值序列
///
/// 第 i 个阈值为 `start - i * step`，由整数下标直接计算，不做累减。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSchedule {
  start: f32,
  step: f32,
  floor: f32,
}

impl Default for ThresholdSchedule {
  fn default() -> Self {
    Self {
      start: DEFAULT_THRESHOLD_START,
      step: DEFAULT_THRESHOLD_STEP,
      floor: DEFAULT_THRESHOLD_FLOOR,
    }
  }
}

impl ThresholdSchedule {
  pub fn new(start: f32, step: f32, floor: f32) -> Result<Self, ScanError> {
    if !(start.is_finite() && step.is_finite() && floor.is_finite()) {
      return Err(ScanError::InvalidSchedule(format!(
        "参数必须为有限值: start={start}, step={step}, floor={floor}"
      )));
    }
    if step <= 0.0 {
      return Err(ScanError::InvalidSchedule(format!(
        "步长必须为正数: {step}"
      )));
    }
    if !(0.0..=1.0).contains(&floor) || !(floor..=1.0).contains(&start) {
      return Err(ScanError::InvalidSchedule(format!(
        "需要 0 <= floor <= start <= 1: start={start}, floor={floor}"
      )));
    }

    Ok(Self { start, step, floor })
  }

  pub fn start(&self) -> f32 {
    self.start
  }

  pub fn step(&self) -> f32 {
    self.step
  }

  pub fn floor(&self) -> f32 {
    self.floor
  }

  /// 不低于下限的阈值个数，默认序列为 30（0.30, 0.29, ..., 0.01）
  pub fn steps(&self) -> usize {
    let span = (self.start as f64 - self.floor as f64) / self.step as f64;
    (span + STEP_COUNT_EPSILON).floor() as usize + 1
  }

  pub fn threshold(&self, index: usize) -> f32 {
    let threshold = (self.start as f64 - index as f64 * self.step as f64) as f32;
    threshold.max(self.floor)
  }

  pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
    (0..self.steps()).map(|index| self.threshold(index))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanConfig {
  pub schedule: ThresholdSchedule,
  /// 整个阈值搜索的墙钟时限，None 表示不限
  pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
  Accepted {
    candidate: Candidate,
    threshold: f32,
    step: usize,
  },
  Exhausted {
    steps: usize,
  },
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdScanner {
  config: ScanConfig,
}

impl ThresholdScanner {
  pub fn new(config: ScanConfig) -> Self {
    Self { config }
  }

  /// 从高阈值向低阈值搜索，返回第一个被接受的检测
  ///
  /// 每个阈值只调用一次检测器，检测按检测器给出的顺序逐个判定。
  /// 检测器失败与超时直接返回错误，不做重试。
  pub fn scan<D: Detector + ?Sized>(
    &self,
    detector: &D,
    image: &RgbImage,
    filter: &DetectionFilter,
  ) -> Result<ScanOutcome, ScanError> {
    let schedule = &self.config.schedule;
    let started = Instant::now();

    for (step, threshold) in schedule.iter().enumerate() {
      let detections =
        detector
          .infer(image, threshold)
          .map_err(|e| ScanError::Detector {
            threshold,
            source: Box::new(e),
          })?;

      if let Some(deadline) = self.config.deadline {
        let elapsed = started.elapsed();
        if elapsed > deadline {
          return Err(ScanError::DeadlineExceeded {
            elapsed,
            deadline,
            steps: step + 1,
          });
        }
      }

      debug!(
        "阈值 {:.3} (第 {} 步): 检测到 {} 个目标",
        threshold,
        step,
        detections.len()
      );

      for detection in &detections {
        match filter.evaluate(detection) {
          Verdict::Accepted(candidate) => {
            info!(
              "阈值 {:.3} 接受检测: {} 置信度 {:.4} 恢复期 {} 天",
              threshold, candidate.kind, candidate.confidence, candidate.recovery_days
            );
            return Ok(ScanOutcome::Accepted {
              candidate,
              threshold,
              step,
            });
          }
          Verdict::Rejected(Rejection::UnknownLabel) => {
            debug!("未知标签，跳过: {}", detection.label);
          }
          Verdict::Rejected(Rejection::Borderline { recovery_days }) => {
            debug!(
              "恢复期估计为最小值 {} 天，跳过: {} 面积 {}",
              recovery_days,
              detection.label,
              detection.bbox.area()
            );
          }
        }
      }
    }

    let steps = schedule.steps();
    info!(
      "阈值降至 {:.3} 仍无有效检测，共 {} 步",
      schedule.floor(),
      steps
    );
    Ok(ScanOutcome::Exhausted { steps })
  }
}
