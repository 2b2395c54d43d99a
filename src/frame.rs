// 该文件是 Mianxiang （面相） 项目的一部分。
// src/frame.rs - 帧与人脸区域定义
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

use image::{RgbImage, imageops};

use crate::detection::BoundingBox;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  /// 采集抖动时得到的空帧
  pub fn empty(index: u64, timestamp_ms: u64) -> Self {
    Self::new(RgbImage::new(0, 0), index, timestamp_ms)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(image, 0, 0)
  }
}

/// 从帧中裁剪出人脸区域
///
/// 返回的子图像拥有独立的像素数据，与原帧不共享可变状态。
/// 边界框退化（宽或高为 0）或超出图像范围时返回 `None`。
pub fn extract_region(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
  if bbox.left < 0 || bbox.top < 0 || bbox.right <= bbox.left || bbox.bottom <= bbox.top {
    return None;
  }

  let (x, y) = (bbox.left as u32, bbox.top as u32);
  let (w, h) = (bbox.width(), bbox.height());
  if x + w > image.width() || y + h > image.height() {
    return None;
  }

  Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]))
  }

  #[test]
  fn region_covers_exact_rectangle() {
    let image = gradient(100, 100);
    let bbox = BoundingBox::new(10, 20, 50, 60);

    let region = extract_region(&image, &bbox).expect("区域应当有效");

    assert_eq!(region.dimensions(), (40, 40));
    assert_eq!(region.get_pixel(0, 0), &Rgb([10, 20, 7]));
    assert_eq!(region.get_pixel(39, 39), &Rgb([49, 59, 7]));
  }

  #[test]
  fn region_is_independent_of_source() {
    let mut image = gradient(32, 32);
    let bbox = BoundingBox::new(1, 1, 9, 9);

    let region = extract_region(&image, &bbox).expect("区域应当有效");
    image.put_pixel(1, 1, Rgb([255, 255, 255]));

    assert_eq!(region.get_pixel(0, 0), &Rgb([1, 1, 7]));
  }

  #[test]
  fn degenerate_box_yields_no_region() {
    let image = gradient(32, 32);

    assert!(extract_region(&image, &BoundingBox::new(5, 5, 5, 10)).is_none());
    assert!(extract_region(&image, &BoundingBox::new(8, 5, 4, 10)).is_none());
    assert!(extract_region(&image, &BoundingBox::new(5, 5, 40, 10)).is_none());
  }

  #[test]
  fn empty_frame_is_detected() {
    assert!(Frame::empty(3, 0).is_empty());
    assert!(!Frame::from(gradient(2, 2)).is_empty());
  }
}
