// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/filter.rs - 单个检测的接受/拒绝判定
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

use crate::{
  estimate::estimate,
  model::{BoundingBox, Detection},
  profile::ProfileTable,
};

/// 被接受的检测，携带原始标签、恢复期估计与原始置信度
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub kind: String,
  pub recovery_days: u32,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
  /// 标签不在标定表中（背景类、植入物等）
  UnknownLabel,
  /// 恢复期估计等于该类型的最小值，视为无临床意义
  Borderline { recovery_days: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
  Accepted(Candidate),
  Rejected(Rejection),
}

impl Verdict {
  pub fn is_accepted(&self) -> bool {
    matches!(self, Verdict::Accepted(_))
  }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionFilter<'a> {
  table: &'a ProfileTable,
}

impl Default for DetectionFilter<'static> {
  fn default() -> Self {
    Self::new(ProfileTable::builtin())
  }
}

impl<'a> DetectionFilter<'a> {
  pub fn new(table: &'a ProfileTable) -> Self {
    Self { table }
  }

  pub fn evaluate(&self, detection: &Detection) -> Verdict {
    let Some(profile) = self.table.get(&detection.label) else {
      return Verdict::Rejected(Rejection::UnknownLabel);
    };

    let recovery_days = estimate(profile, detection.bbox.area());
    // 估计值落到最小恢复期时不作为有效骨折，即使检测器给出了结果
    if recovery_days == profile.recovery_min() {
      return Verdict::Rejected(Rejection::Borderline { recovery_days });
    }

    Verdict::Accepted(Candidate {
      kind: detection.label.clone(),
      recovery_days,
      confidence: detection.confidence,
      bbox: detection.bbox,
    })
  }
}
