// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/profile.rs - 骨折类型恢复期标定表
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

use std::collections::HashMap;
use std::sync::LazyLock;

use thiserror::Error;
use tracing::debug;

/// 内置标定: (标签, area_min, area_max, recovery_min, recovery_max)，单位为像素和天
const BUILTIN_PROFILES: [(&str, u64, u64, u32, u32); 7] = [
  ("elbow-positive", 200, 4000, 20, 40),
  ("fingers-positive", 50, 1500, 7, 15),
  ("forearm-fracture", 300, 6000, 25, 45),
  ("humerus-fracture", 300, 8000, 30, 50),
  ("humerus", 300, 6000, 30, 50),
  ("shoulder-fracture", 300, 7000, 35, 55),
  ("wrist-positive", 100, 3000, 10, 20),
];

static BUILTIN_TABLE: LazyLock<ProfileTable> = LazyLock::new(|| {
  ProfileTable::from_entries(BUILTIN_PROFILES.iter().map(
    |&(label, area_min, area_max, recovery_min, recovery_max)| {
      let profile = RecoveryProfile::new(area_min, area_max, recovery_min, recovery_max)
        .expect("内置恢复期标定无效");
      (label, profile)
    },
  ))
  .expect("内置恢复期标定表无效")
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
  #[error("面积区间无效: area_min={0} 必须小于 area_max={1}")]
  InvalidArea(u64, u64),
  #[error("恢复期区间无效: recovery_min={0} 不能大于 recovery_max={1}")]
  InvalidRecovery(u32, u32),
  #[error("标签为空")]
  EmptyLabel,
  #[error("标签重复: {0}")]
  DuplicateLabel(String),
}

/// 单一骨折类型的标定：检测框面积区间映射到恢复天数区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryProfile {
  area_min: u64,
  area_max: u64,
  recovery_min: u32,
  recovery_max: u32,
}

impl RecoveryProfile {
  pub fn new(
    area_min: u64,
    area_max: u64,
    recovery_min: u32,
    recovery_max: u32,
  ) -> Result<Self, ProfileError> {
    if area_min >= area_max {
      return Err(ProfileError::InvalidArea(area_min, area_max));
    }
    if recovery_min > recovery_max {
      return Err(ProfileError::InvalidRecovery(recovery_min, recovery_max));
    }

    Ok(Self {
      area_min,
      area_max,
      recovery_min,
      recovery_max,
    })
  }

  pub fn area_min(&self) -> u64 {
    self.area_min
  }

  pub fn area_max(&self) -> u64 {
    self.area_max
  }

  pub fn recovery_min(&self) -> u32 {
    self.recovery_min
  }

  pub fn recovery_max(&self) -> u32 {
    self.recovery_max
  }
}

/// 标签到标定的只读查找表，构建时校验，构建后不再修改
#[derive(Debug, Clone)]
pub struct ProfileTable {
  profiles: HashMap<String, RecoveryProfile>,
}

impl ProfileTable {
  /// 内置的七种骨折类型标定，进程内只初始化一次
  pub fn builtin() -> &'static ProfileTable {
    &BUILTIN_TABLE
  }

  pub fn from_entries<I, S>(entries: I) -> Result<Self, ProfileError>
  where
    I: IntoIterator<Item = (S, RecoveryProfile)>,
    S: AsRef<str>,
  {
    let mut profiles = HashMap::new();
    for (label, profile) in entries {
      let key = normalize_label(label.as_ref());
      if key.is_empty() {
        return Err(ProfileError::EmptyLabel);
      }
      if profiles.contains_key(&key) {
        return Err(ProfileError::DuplicateLabel(key));
      }
      debug!("注册恢复期标定: {} => {:?}", key, profile);
      profiles.insert(key, profile);
    }

    Ok(Self { profiles })
  }

  /// 按检测标签查找标定，未知标签返回 None
  pub fn get(&self, label: &str) -> Option<&RecoveryProfile> {
    self.profiles.get(&normalize_label(label))
  }

  pub fn len(&self) -> usize {
    self.profiles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.profiles.is_empty()
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.profiles.keys().map(String::as_str)
  }
}

/// 统一标签写法: 去除首尾空白，小写，空格与下划线替换为 '-'
///
/// 检测模型输出的类别名为 `elbow positive` 这种形式，而标定表使用
/// `elbow-positive`，两者需要指向同一条标定。
pub fn normalize_label(label: &str) -> String {
  label
    .trim()
    .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("-")
    .to_lowercase()
}
