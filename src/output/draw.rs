// 该文件是 Fracture Triage （骨折分诊） 项目的一部分。
// src/output/draw.rs - 骨折检测框标注
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

use image::{Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::debug;

use crate::model::BoundingBox;

const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: u32 = 3;
const MAX_BOX_THICKNESS: u32 = 64;
const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("图像编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
  #[error("JPEG 质量无效: {0}，应在 1 到 100 之间")]
  InvalidQuality(u8),
  #[error("线宽无效: {0}，应在 1 到 64 之间")]
  InvalidThickness(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawStyle {
  color: [u8; 3],
  thickness: u32,
  jpeg_quality: u8,
}

impl Default for DrawStyle {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
      jpeg_quality: JPEG_QUALITY,
    }
  }
}

impl DrawStyle {
  pub fn thickness(mut self, thickness: u32) -> Result<Self, RenderError> {
    if thickness == 0 || thickness > MAX_BOX_THICKNESS {
      return Err(RenderError::InvalidThickness(thickness));
    }
    self.thickness = thickness;
    Ok(self)
  }

  pub fn jpeg_quality(mut self, quality: u8) -> Result<Self, RenderError> {
    if !(1..=100).contains(&quality) {
      return Err(RenderError::InvalidQuality(quality));
    }
    self.jpeg_quality = quality;
    Ok(self)
  }
}

/// 在原图副本上绘制检测框并编码为 JPEG
#[derive(Debug, Clone, Default)]
pub struct AnnotationRenderer {
  style: DrawStyle,
}

impl AnnotationRenderer {
  pub fn new(style: DrawStyle) -> Self {
    Self { style }
  }

  pub fn style(&self) -> &DrawStyle {
    &self.style
  }

  pub fn render(&self, image: &RgbImage, bbox: &BoundingBox) -> Result<Vec<u8>, RenderError> {
    let mut annotated = image.clone();
    self.draw_bbox(&mut annotated, bbox);
    self.encode(&annotated)
  }

  // 线宽以框线为中心向内外两侧展开，超出图像的部分自动裁剪
  pub fn draw_bbox(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    let thickness = i64::from(self.style.thickness);
    let outward = thickness / 2;
    let color = Rgb(self.style.color);

    // 距图像一个线宽以外的框线不可见，先收拢坐标，避免后续尺寸计算溢出
    let margin = thickness + 1;
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let clamp_x = |x: i32| i64::from(x).clamp(-margin, w + margin);
    let clamp_y = |y: i32| i64::from(y).clamp(-margin, h + margin);
    let (x_min, x_max) = (clamp_x(bbox.xmin()), clamp_x(bbox.xmax()));
    let (y_min, y_max) = (clamp_y(bbox.ymin()), clamp_y(bbox.ymax()));

    for offset in -outward..(thickness - outward) {
      let width = x_max - x_min + 1 - 2 * offset;
      let height = y_max - y_min + 1 - 2 * offset;
      if width <= 0 || height <= 0 {
        continue;
      }

      let (Ok(left), Ok(top), Ok(width), Ok(height)) = (
        i32::try_from(x_min + offset),
        i32::try_from(y_min + offset),
        u32::try_from(width),
        u32::try_from(height),
      ) else {
        continue;
      };
      draw_hollow_rect_mut(image, Rect::at(left, top).of_size(width, height), color);
    }
  }

  pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, self.style.jpeg_quality).encode_image(image)?;
    debug!(
      "标注图像编码完成: {}x{}，{} 字节",
      image.width(),
      image.height(),
      bytes.len()
    );
    Ok(bytes)
  }
}
