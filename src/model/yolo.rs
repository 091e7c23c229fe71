// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/model/yolo.rs - RKNPU 骨折检测 YOLO 模型
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

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  model::{BoundingBox, Detection, Detector},
};

/// 训练数据集的类别顺序
pub const FRACTURE_CLASSES: [&str; 7] = [
  "elbow positive",
  "fingers positive",
  "forearm fracture",
  "humerus fracture",
  "humerus",
  "shoulder fracture",
  "wrist positive",
];

const YOLO_NUM_INPUTS: u32 = 1;
const YOLO_NUM_OUTPUTS: u32 = 6;
const YOLO_CLASS_NUM: usize = FRACTURE_CLASSES.len();
const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
const YOLO_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO_NMS_THRESH: f32 = 0.45;

#[derive(Error, Debug)]
pub enum FractureYoloError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl FractureYoloError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    FractureYoloError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct FractureYoloBuilder {
  model_path: String,
  flags: InitFlags,
  nms_threshold: f32,
}

impl FromUrlWithScheme for FractureYoloBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for FractureYoloBuilder {
  type Error = FractureYoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FractureYoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let nms_threshold = url
      .query_pairs()
      .find(|(k, _)| k == "nms")
      .map(|(_, v)| {
        v.parse::<f32>()
          .map_err(|e| FractureYoloError::ModelPathError(format!("NMS 阈值无效 '{}': {}", v, e)))
      })
      .transpose()?
      .unwrap_or(YOLO_NMS_THRESH);

    Ok(FractureYoloBuilder {
      model_path: decoded_path(url),
      flags: InitFlags::default(),
      nms_threshold,
    })
  }
}

impl FractureYoloBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<FractureYolo, FractureYoloError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| FractureYoloError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| FractureYoloError::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO_NUM_INPUTS || num_outputs != YOLO_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO_NUM_INPUTS, YOLO_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(FractureYoloError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(FractureYolo {
      context,
      nms_threshold: self.nms_threshold,
    })
  }
}

/// 运行在 RKNPU 上的骨折检测模型，阈值在后处理阶段应用
pub struct FractureYolo {
  context: Context,
  nms_threshold: f32,
}

/// 根据张量大小匹配回归和分类输出，返回 (reg, cls)
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

#[derive(Debug, Clone)]
struct RawBox {
  class_id: usize,
  score: f32,
  bbox: [f32; 4], // 归一化坐标 [x_min, y_min, x_max, y_max]
}

impl FractureYolo {
  fn preprocess(image: &RgbImage) -> Vec<u8> {
    image::imageops::resize(image, YOLO_INPUT_W, YOLO_INPUT_H, FilterType::Triangle).into_raw()
  }

  fn postprocess(
    &self,
    output: &rknpu::Output,
    confidence_threshold: f32,
  ) -> Result<Vec<RawBox>, FractureYoloError> {
    let (input_w, input_h) = (YOLO_INPUT_W as f32, YOLO_INPUT_H as f32);
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO_HEAD_SIZES.iter().zip(YOLO_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;

      let Some((reg, cls)) =
        match_reg_cls_tensors(tensor1, tensor2, 4 * spatial, YOLO_CLASS_NUM * spatial)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        return Err(FractureYoloError::invalid(
          "检测头输出大小不匹配",
          rknpu::Error::InvalidModel,
        ));
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (class_id, max_logit) = (0..YOLO_CLASS_NUM)
            .map(|c| (c, cls[c * spatial + idx]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
          let score = sigmoid(max_logit);
          if score < confidence_threshold {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;
          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

          items.push(RawBox {
            class_id,
            score,
            bbox: [xmin / input_w, ymin / input_h, xmax / input_w, ymax / input_h],
          });
        }
      }
    }

    Ok(nms(items, self.nms_threshold))
  }
}

impl Detector for FractureYolo {
  type Error = FractureYoloError;

  fn infer(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let input = Self::preprocess(image);

    debug!("设置模型输入");
    self
      .context
      .set_input(0, &input, TensorFormat::NHWC, TensorType::UInt8)?;
    debug!("执行模型推理");
    self.context.run()?;
    let output = self.context.get_outputs()?;

    let detections = self
      .postprocess(&output, confidence_threshold)?
      .into_iter()
      .filter_map(|item| {
        let bbox = BoundingBox::from_xyxy([
          item.bbox[0] * width,
          item.bbox[1] * height,
          item.bbox[2] * width,
          item.bbox[3] * height,
        ])?;
        Some(Detection {
          bbox,
          label: FRACTURE_CLASSES[item.class_id].to_string(),
          confidence: item.score,
        })
      })
      .collect::<Vec<_>>();

    debug!("阈值 {:.3} 检测到 {} 个目标", confidence_threshold, detections.len());
    Ok(detections)
  }
}

/// 同类别非极大值抑制，结果按置信度降序
fn nms(mut items: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<RawBox> = Vec::new();
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
