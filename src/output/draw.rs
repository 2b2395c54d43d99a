// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/draw.rs - 人脸框与属性标签绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{detection::BoundingBox, layout::Anchor, output::Canvas, url_query};

// 文本渲染常量
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";
const LABEL_FONT_SIZE: f32 = 24.0;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("读取字体文件失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font: FontArc,
  font_size: f32,
  box_color: [u8; 3],
  label_color: [u8; 3],
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
    }
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    debug!("加载字体文件: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self::new(font))
  }

  /// 读取 URL 中的 `font` 与 `font-size` 参数
  pub fn from_url(url: &Url) -> Result<Self, DrawError> {
    let font = url_query(url, "font").unwrap_or_else(|| DEFAULT_FONT_PATH.to_string());
    let draw = Self::from_font_file(font)?;
    Ok(match url_query(url, "font-size").and_then(|v| v.parse().ok()) {
      Some(size) => draw.with_font_size(size),
      None => draw,
    })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  fn scale(&self) -> PxScale {
    PxScale::from(self.font_size)
  }
}

impl Canvas for Draw {
  fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    let color = Rgb(self.box_color);

    // 绘制边框（加粗为2像素）
    for thickness in 0..BOX_THICKNESS {
      let width = bbox.width().saturating_sub(2 * thickness as u32);
      let height = bbox.height().saturating_sub(2 * thickness as u32);
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at(bbox.left + thickness, bbox.top + thickness).of_size(width, height);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn draw_text(&self, image: &mut RgbImage, text: &str, anchor: Anchor) {
    // imageproc 以左上角定位文字
    let y = anchor.y - self.text_height(text) as i32;
    draw_text_mut(
      image,
      Rgb(self.label_color),
      anchor.x,
      y,
      self.scale(),
      &self.font,
      text,
    );
  }

  fn text_height(&self, text: &str) -> u32 {
    text_size(self.scale(), &self.font, text).1
  }
}
