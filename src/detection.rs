// 该文件是 Mianxiang （面相） 项目的一部分。
// src/detection.rs - 人脸检测与输出解码
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

use image::RgbImage;
use tracing::debug;

use crate::{
  blob::{Blob, BlobParams},
  model::Model,
};

/// 每条检测记录的长度: [batch, class, confidence, x1, y1, x2, y2]
pub const DETECTION_RECORD_LEN: usize = 7;
/// 默认置信度阈值
pub const DETECTION_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// 像素坐标下的边界框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub left: i32,
  pub top: i32,
  pub right: i32,
  pub bottom: i32,
}

impl BoundingBox {
  pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  /// 由任意两个对角点构造，坐标按大小排序
  pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
    Self::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
  }

  pub fn width(&self) -> u32 {
    (self.right - self.left).max(0) as u32
  }

  pub fn height(&self) -> u32 {
    (self.bottom - self.top).max(0) as u32
  }

  /// 是否严格位于 `(0, width) x (0, height)` 内部
  pub fn is_interior(&self, width: u32, height: u32) -> bool {
    self.right < width as i32 && self.bottom < height as i32 && self.left > 0 && self.top > 0
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub confidence: f32,
  pub bbox: BoundingBox,
}

/// 解码人脸检测器输出
///
/// 按 7 个元素一组遍历张量，保留置信度高于 `threshold` 的记录，
/// 将归一化坐标换算为像素坐标（向零截断），两个角点顺序颠倒时交换。
/// 触碰或越过帧边界的框直接丢弃，不做裁剪。
/// 末尾不足一组的数据被忽略。
pub fn decode_detections(tensor: &[f32], width: u32, height: u32, threshold: f32) -> Vec<Detection> {
  let (w, h) = (width as f32, height as f32);

  tensor
    .chunks_exact(DETECTION_RECORD_LEN)
    .filter(|record| record[2] > threshold)
    .filter_map(|record| {
      let bbox = BoundingBox::from_corners(
        (record[3] * w) as i32,
        (record[4] * h) as i32,
        (record[5] * w) as i32,
        (record[6] * h) as i32,
      );
      if bbox.is_interior(width, height) {
        Some(Detection {
          confidence: record[2],
          bbox,
        })
      } else {
        debug!("丢弃触碰边界的检测框: {:?}", bbox);
        None
      }
    })
    .collect()
}

/// 人脸检测能力
pub trait Detector {
  type Error;

  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error>;
}

/// 基于 SSD 输出格式的人脸检测器
pub struct FaceDetector<M> {
  model: M,
  params: BlobParams,
  threshold: f32,
}

impl<M: Model> FaceDetector<M> {
  pub fn new(model: M) -> Self {
    Self {
      model,
      params: BlobParams::FACE_DETECTOR,
      threshold: DETECTION_CONFIDENCE_THRESHOLD,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }
}

impl<M: Model> Detector for FaceDetector<M> {
  type Error = M::Error;

  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error> {
    let blob = Blob::from_image(image, self.params);
    let output = self.model.infer(&blob)?;
    let detections = decode_detections(&output, image.width(), image.height(), self.threshold);
    debug!("检测到 {} 张人脸", detections.len());
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_record_on_square_frame() {
    let tensor = [0.0, 0.0, 0.9, 0.1, 0.1, 0.5, 0.5];

    let detections = decode_detections(&tensor, 100, 100, DETECTION_CONFIDENCE_THRESHOLD);

    assert_eq!(
      detections,
      vec![Detection {
        confidence: 0.9,
        bbox: BoundingBox::new(10, 10, 50, 50),
      }]
    );
  }

  #[test]
  fn reversed_corners_are_reordered() {
    let tensor = [0.0, 0.0, 0.9, 0.5, 0.1, 0.1, 0.5];

    let detections = decode_detections(&tensor, 100, 100, DETECTION_CONFIDENCE_THRESHOLD);

    assert_eq!(
      detections,
      vec![Detection {
        confidence: 0.9,
        bbox: BoundingBox::new(10, 10, 50, 50),
      }]
    );
  }

  #[test]
  fn reversed_box_touching_edge_is_excluded() {
    let tensor = [0.0, 0.0, 0.9, 0.5, 0.1, 0.0, 0.5];

    assert!(decode_detections(&tensor, 100, 100, DETECTION_CONFIDENCE_THRESHOLD).is_empty());
  }

  #[test]
  fn low_confidence_records_are_dropped() {
    let tensor = [
      0.0, 0.0, 0.5, 0.1, 0.1, 0.5, 0.5, //
      0.0, 0.0, 0.2, 0.1, 0.1, 0.5, 0.5, //
      0.0, 0.0, f32::NAN, 0.1, 0.1, 0.5, 0.5,
    ];

    assert!(decode_detections(&tensor, 100, 100, DETECTION_CONFIDENCE_THRESHOLD).is_empty());
  }

  #[test]
  fn boundary_touching_boxes_are_excluded_not_clamped() {
    let tensor = [
      0.0, 0.0, 0.9, 0.0, 0.1, 0.5, 0.5, // left == 0
      0.0, 0.0, 0.9, 0.1, 0.0, 0.5, 0.5, // top == 0
      0.0, 0.0, 0.9, 0.1, 0.1, 1.0, 0.5, // right == width
      0.0, 0.0, 0.9, 0.1, 0.1, 0.5, 1.2, // bottom > height
      0.0, 0.0, 0.9, -0.1, 0.1, 0.5, 0.5, // left < 0
      0.0, 0.0, 0.8, 0.2, 0.2, 0.9, 0.9, // interior
    ];

    let detections = decode_detections(&tensor, 100, 100, DETECTION_CONFIDENCE_THRESHOLD);

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox, BoundingBox::new(20, 20, 90, 90));
  }

  #[test]
  fn every_emitted_detection_is_interior() {
    let mut tensor = Vec::new();
    for i in 0..50 {
      let f = i as f32 / 50.0;
      tensor.extend_from_slice(&[0.0, 1.0, 0.3 + f * 0.6, f - 0.1, f * 0.5, f + 0.3, 1.1 - f]);
    }
    let (width, height) = (64, 48);

    for det in decode_detections(&tensor, width, height, DETECTION_CONFIDENCE_THRESHOLD) {
      assert!(det.confidence > 0.5);
      assert!(det.bbox.left > 0 && det.bbox.top > 0);
      assert!(det.bbox.right < width as i32 && det.bbox.bottom < height as i32);
    }
  }

  #[test]
  fn trailing_partial_record_is_ignored() {
    let tensor = [
      0.0, 0.0, 0.9, 0.1, 0.1, 0.5, 0.5, //
      0.0, 0.0, 0.9, 0.2,
    ];

    assert_eq!(decode_detections(&tensor, 100, 100, 0.5).len(), 1);
    assert!(decode_detections(&tensor[..5], 100, 100, 0.5).is_empty());
  }

  #[test]
  fn decoding_is_idempotent() {
    let tensor = [
      0.0, 0.0, 0.9, 0.1, 0.1, 0.5, 0.5, //
      0.0, 0.0, 0.7, 0.3, 0.25, 0.6, 0.75,
    ];

    let first = decode_detections(&tensor, 640, 480, 0.5);
    let second = decode_detections(&tensor, 640, 480, 0.5);

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
  }

  #[test]
  fn coordinates_truncate_toward_zero() {
    let tensor = [0.0, 0.0, 0.9, 0.119, 0.259, 0.501, 0.999];

    let detections = decode_detections(&tensor, 10, 10, 0.5);

    assert_eq!(detections[0].bbox, BoundingBox::new(1, 2, 5, 9));
  }
}
