// 该文件是 Mianxiang （面相） 项目的一部分。
// src/annotate.rs - 单帧人脸属性标注
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
use thiserror::Error;
use tracing::debug;

use crate::{
  classify::{Attribute, ClassifyError, Classifier, FusedResult},
  detection::{Detection, Detector},
  frame::extract_region,
  layout::layout_labels,
  output::Canvas,
};

/// 一张人脸的检测与三项属性
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
  pub detection: Detection,
  /// 按显示顺序排列：性别、年龄、情绪
  pub results: [FusedResult; 3],
}

impl FaceAnnotation {
  pub fn labels(&self) -> Vec<&str> {
    self.results.iter().map(|r| r.label.as_str()).collect()
  }
}

#[derive(Error, Debug)]
pub enum AnnotateError<DE, CE> {
  #[error("人脸检测错误: {0}")]
  Detect(DE),
  #[error("属性分类错误: {0}")]
  Classify(ClassifyError<CE>),
}

/// 单帧处理流水线：检测、裁剪、分类、融合、排版、绘制
pub struct FaceAnnotator<D, C> {
  detector: D,
  // 按显示顺序：性别、年龄、情绪
  classifiers: [C; 3],
}

impl<D: Detector, C: Classifier> FaceAnnotator<D, C> {
  /// 组装流水线，每个分类器必须对应正确的属性
  pub fn new(
    detector: D,
    emotion: C,
    age: C,
    gender: C,
  ) -> Result<Self, ClassifyError<C::Error>> {
    let classifiers = [gender, age, emotion];
    for (classifier, expected) in classifiers.iter().zip(Attribute::PRESENTATION_ORDER) {
      if classifier.attribute() != expected {
        return Err(ClassifyError::Misbound {
          expected,
          actual: classifier.attribute(),
        });
      }
    }

    Ok(Self {
      detector,
      classifiers,
    })
  }

  /// 对一张人脸区域依次运行三个分类器
  fn classify_region(
    &self,
    region: &RgbImage,
  ) -> Result<[FusedResult; 3], ClassifyError<C::Error>> {
    let [gender, age, emotion] = &self.classifiers;
    Ok([
      gender.classify(region)?,
      age.classify(region)?,
      emotion.classify(region)?,
    ])
  }

  /// 处理一帧并在图像上绘制标注
  ///
  /// 先完成全部人脸的分类再绘制，分类器看到的始终是未经绘制的像素。
  /// 退化的检测框不参与分类，但仍然绘制边框。
  pub fn annotate<K: Canvas + ?Sized>(
    &self,
    image: &mut RgbImage,
    canvas: &K,
  ) -> Result<Vec<FaceAnnotation>, AnnotateError<D::Error, C::Error>> {
    let detections = self.detector.detect(image).map_err(AnnotateError::Detect)?;

    let mut faces = Vec::with_capacity(detections.len());
    let mut degenerate = Vec::new();
    for detection in detections {
      let Some(region) = extract_region(image, &detection.bbox) else {
        debug!("退化的检测框不参与分类: {:?}", detection.bbox);
        degenerate.push(detection.bbox);
        continue;
      };
      let results = self
        .classify_region(&region)
        .map_err(AnnotateError::Classify)?;
      drop(region);

      let face = FaceAnnotation { detection, results };
      debug!(
        "人脸 {:?} ({:.2}): {:?}",
        face.detection.bbox,
        face.detection.confidence,
        face.labels()
      );
      faces.push(face);
    }

    for bbox in &degenerate {
      canvas.draw_box(image, bbox);
    }
    for face in &faces {
      canvas.draw_box(image, &face.detection.bbox);
      let labels = face.labels();
      let anchors = layout_labels(&face.detection.bbox, &labels, |text| canvas.text_height(text));
      for (label, anchor) in labels.iter().zip(anchors) {
        canvas.draw_text(image, label, anchor);
      }
    }

    Ok(faces)
  }
}
