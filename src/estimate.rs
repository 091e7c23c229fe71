// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/estimate.rs - 恢复期估计
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

use crate::profile::RecoveryProfile;

/// 按检测框面积在标定区间内线性插值恢复天数
///
/// 面积不大于 `area_min` 时取 `recovery_min`，不小于 `area_max` 时取
/// `recovery_max`，其余线性插值后四舍五入（0.5 远离零方向进位）。
/// 结果对面积单调不减，且始终落在 `[recovery_min, recovery_max]` 内。
pub fn estimate(profile: &RecoveryProfile, area: u64) -> u32 {
  let (area_min, area_max) = (profile.area_min(), profile.area_max());
  let (recovery_min, recovery_max) = (profile.recovery_min(), profile.recovery_max());

  if area <= area_min {
    return recovery_min;
  }
  if area >= area_max {
    return recovery_max;
  }

  let ratio = (area - area_min) as f64 / (area_max - area_min) as f64;
  let days = recovery_min as f64 + ratio * (recovery_max - recovery_min) as f64;

  (days.round() as u32).clamp(recovery_min, recovery_max)
}
