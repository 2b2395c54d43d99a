// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  annotate::FaceAnnotation,
  frame::Frame,
  output::{Render, draw::{Draw, DrawError}},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("字体错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 人脸标注记录，与图像同名的 `.json` 文件
pub struct Record;

impl Record {
  pub fn to_json(frame: &Frame, faces: &[FaceAnnotation]) -> Value {
    let faces: Vec<Value> = faces
      .iter()
      .map(|face| {
        let bbox = &face.detection.bbox;
        let mut attributes = serde_json::Map::new();
        for result in &face.results {
          attributes.insert(result.attribute.to_string(), json!(result.label));
        }
        json!({
          "confidence": face.detection.confidence,
          "bbox": [bbox.left, bbox.top, bbox.right, bbox.bottom],
          "attributes": attributes,
        })
      })
      .collect();

    json!({
      "frame": frame.index,
      "timestamp_ms": frame.timestamp_ms,
      "width": frame.width(),
      "height": frame.height(),
      "faces": faces,
    })
  }

  pub fn record(
    frame: &Frame,
    faces: &[FaceAnnotation],
    path: &Path,
  ) -> Result<(), DirectoryRecordOutputError> {
    let content = serde_json::to_string_pretty(&Self::to_json(frame, faces))?;
    std::fs::write(path.with_extension("json"), content)?;
    Ok(())
  }
}

/// 按日期分目录保存含人脸的标注帧
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  frame_counter: AtomicU16,
  always: bool,
  record: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      draw: Draw::from_url(uri)?,
      frame_counter: AtomicU16::new(0),
      always,
      record,
    })
  }
}

impl DirectoryRecordOutput {
  pub(crate) fn draw(&self) -> &Draw {
    &self.draw
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

crate::output::delegate_canvas!(DirectoryRecordOutput);

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, faces: &[FaceAnnotation]) -> Result<(), Self::Error> {
    if !self.always && faces.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    frame.image.save(&path)?;
    if self.record {
      Record::record(frame, faces, &path)?;
    }
    debug!("保存标注帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;
  use crate::{
    classify::{Attribute, FusedResult},
    detection::{BoundingBox, Detection},
  };

  #[test]
  fn record_lists_faces_with_attributes() {
    let frame = Frame::new(RgbImage::new(100, 80), 12, 400);
    let faces = vec![FaceAnnotation {
      detection: Detection {
        confidence: 0.75,
        bbox: BoundingBox::new(10, 10, 50, 50),
      },
      results: [
        FusedResult {
          label: "Male".to_string(),
          attribute: Attribute::Gender,
        },
        FusedResult {
          label: "20-36".to_string(),
          attribute: Attribute::Age,
        },
        FusedResult {
          label: "Happy".to_string(),
          attribute: Attribute::Emotion,
        },
      ],
    }];

    let value = Record::to_json(&frame, &faces);

    assert_eq!(value["frame"], 12);
    assert_eq!(value["width"], 100);
    assert_eq!(value["faces"][0]["bbox"], json!([10, 10, 50, 50]));
    assert_eq!(value["faces"][0]["attributes"]["age"], "20-36");
    assert_eq!(value["faces"][0]["attributes"]["emotion"], "Happy");
    assert_eq!(value["faces"][0]["attributes"]["gender"], "Male");
  }
}
