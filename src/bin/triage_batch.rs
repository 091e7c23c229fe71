// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/bin/triage_batch.rs - 批量影像分诊
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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use url::Url;

use fracture_triage::{
  FromUrl, Triage,
  input::InputWrapper,
  model::DetectorWrapper,
  output::OutputWrapper,
  scan::ScanConfig,
  task::{BatchTask, Task},
};
use tracing::{info, warn};

/// 批量骨折分诊
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器 (replay:///path/detections.json 或 yolo:///path/model.rknn)
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源 (folder:///path/xrays 或 image:///path/xray.jpg)
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 报告目录 (folder:///path/reports，加 ?always 同时记录阴性结果)
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 单张影像阈值搜索的时限（毫秒）
  #[arg(long, value_name = "MILLIS")]
  pub deadline_ms: Option<u64>,
  /// 最多处理的影像数
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = InputWrapper::from_url(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.model)?;
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;

  let triage = Triage::new(detector).with_scan_config(ScanConfig {
    deadline: args.deadline_ms.map(Duration::from_millis),
    ..ScanConfig::default()
  });

  let summary = BatchTask::default()
    .with_max_images(args.max_images)
    .interruptible(true)
    .run_task(input, &triage, output)?;

  if summary.failed > 0 {
    warn!("{} 张影像分诊失败", summary.failed);
  }

  Ok(())
}
