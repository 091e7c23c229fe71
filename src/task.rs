// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/task.rs - 分诊任务
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::{Triage, TriageResult, input::InputImage, model::Detector, output::Render};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    triage: &Triage<'_, D>,
    output: O,
  ) -> Result<TaskSummary, Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
  pub detected: usize,
  pub negative: usize,
  pub failed: usize,
}

impl TaskSummary {
  pub fn total(&self) -> usize {
    self.detected + self.negative + self.failed
  }

  fn record(&mut self, result: &TriageResult) {
    if result.detected() {
      self.detected += 1;
    } else {
      self.negative += 1;
    }
  }
}

fn print_result(source: &InputImage, result: &TriageResult) -> anyhow::Result<()> {
  let json = result
    .to_json()
    .with_context(|| format!("无法序列化 {} 的分诊结果", source.name))?;
  println!("{}", json);
  Ok(())
}

/// 只处理第一张影像，任何失败都作为任务失败返回
pub struct OneShotTask;

impl<I, D, O, IE, RE> Task<I, D, O> for OneShotTask
where
  I: Iterator<Item = Result<InputImage, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  D: Detector,
  O: Render<InputImage, TriageResult, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    triage: &Triage<'_, D>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let source = input.next().ok_or_else(|| anyhow::anyhow!("没有输入影像"))??;
    info!("输入影像 {} 获取成功，开始分诊...", source.name);

    let now = std::time::Instant::now();
    let result = triage
      .run(&source.bytes)
      .with_context(|| format!("影像 {} 分诊失败", source.name))?;
    info!("分诊完成，耗时: {:.2?}", now.elapsed());

    output.render_result(&source, &result)?;
    print_result(&source, &result)?;

    let mut summary = TaskSummary::default();
    summary.record(&result);
    Ok(summary)
  }
}

/// 依次处理全部影像，单张失败只记录不终止
#[derive(Default, Debug)]
pub struct BatchTask {
  max_images: Option<usize>,
  interruptible: bool,
}

impl BatchTask {
  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }

  /// 安装 Ctrl-C 处理，收到信号后处理完当前影像即退出
  pub fn interruptible(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }

  fn interrupt_flag(&self) -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    if self.interruptible {
      let handler_flag = flag.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        handler_flag.store(true, Ordering::SeqCst);
      })
      .context("无法设置 Ctrl-C 处理函数")?;
    }
    Ok(flag)
  }
}

impl<I, D, O, IE, RE> Task<I, D, O> for BatchTask
where
  I: Iterator<Item = Result<InputImage, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  D: Detector,
  O: Render<InputImage, TriageResult, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    triage: &Triage<'_, D>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始批量任务...");
    let interrupted = self.interrupt_flag()?;
    let mut summary = TaskSummary::default();

    for (index, source) in input.enumerate() {
      if self.max_images.is_some_and(|n| index >= n) {
        info!("达到指定影像数 {}, 退出任务循环", index);
        break;
      }

      let source = match source {
        Ok(source) => source,
        Err(e) => {
          error!("读取第 {} 张影像失败: {}", index + 1, e);
          summary.failed += 1;
          continue;
        }
      };

      info!("处理第 {} 张影像: {}", index + 1, source.name);
      let now = std::time::Instant::now();
      match triage.run(&source.bytes) {
        Ok(result) => {
          output.render_result(&source, &result)?;
          print_result(&source, &result)?;
          summary.record(&result);
          info!("分诊完成，耗时: {:.2?}", now.elapsed());
        }
        Err(e) => {
          error!("影像 {} 分诊失败: {}", source.name, e);
          summary.failed += 1;
        }
      }

      if interrupted.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成: 共 {} 张，阳性 {}，阴性 {}，失败 {}",
      summary.total(),
      summary.detected,
      summary.negative,
      summary.failed
    );
    Ok(summary)
  }
}
