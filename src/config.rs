// 该文件是 Mianxiang （面相） 项目的一部分。
// src/config.rs - 命令行参数与流水线组装
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

use clap::Parser;
use url::Url;

use crate::detection::DETECTION_CONFIDENCE_THRESHOLD;

/// Mianxiang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 人脸检测模型，例如 rknn:///opt/models/face.rknn
  #[arg(long, value_name = "MODEL")]
  pub face_model: Url,
  /// 情绪分类模型
  #[arg(long, value_name = "MODEL")]
  pub emotion_model: Url,
  /// 年龄分类模型
  #[arg(long, value_name = "MODEL")]
  pub age_model: Url,
  /// 性别分类模型
  #[arg(long, value_name = "MODEL")]
  pub gender_model: Url,

  /// 输入来源
  /// - 摄像头: gst://camera/dev/video0?width=640&height=480
  /// - 视频: gst://file/path/to/video.mp4
  /// - 图片: image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出
  /// - 窗口: gst://display
  /// - 视频: gst:///path/to/out.mp4
  /// - 图片: image:///path/to/out.png
  /// - 目录: folder:///path/to/dir?always&record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 人脸检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DETECTION_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 最大处理帧数，不指定则处理到输入结束
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

#[cfg(feature = "model_rknn")]
mod rknn {
  use tracing::info;

  use super::Args;
  use crate::{
    FromUrl,
    annotate::FaceAnnotator,
    classify::{Attribute, AttributeClassifier},
    detection::FaceDetector,
    model::{RknnModel, RknnModelBuilder},
  };

  pub type RknnFaceAnnotator = FaceAnnotator<FaceDetector<RknnModel>, AttributeClassifier<RknnModel>>;

  fn load_model(url: &url::Url) -> anyhow::Result<RknnModel> {
    Ok(RknnModelBuilder::from_url(url)?.build()?)
  }

  fn bind(attribute: Attribute, url: &url::Url) -> anyhow::Result<AttributeClassifier<RknnModel>> {
    info!("加载 {} 分类模型: {}", attribute, url);
    let model = load_model(url)?;
    Ok(AttributeClassifier::bind(
      attribute,
      model,
      attribute.default_labels(),
    )?)
  }

  impl Args {
    /// 加载全部模型并组装标注流水线，任何一步失败都终止启动
    pub fn build_annotator(&self) -> anyhow::Result<RknnFaceAnnotator> {
      info!("加载人脸检测模型: {}", self.face_model);
      let detector = FaceDetector::new(load_model(&self.face_model)?).with_threshold(self.confidence);

      let emotion = bind(Attribute::Emotion, &self.emotion_model)?;
      let age = bind(Attribute::Age, &self.age_model)?;
      let gender = bind(Attribute::Gender, &self.gender_model)?;

      Ok(FaceAnnotator::new(detector, emotion, age, gender)?)
    }
  }
}

#[cfg(feature = "model_rknn")]
pub use self::rknn::RknnFaceAnnotator;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_url_options() {
    let args = Args::try_parse_from([
      "mianxiang",
      "--face-model",
      "rknn:///models/face.rknn",
      "--emotion-model",
      "rknn:///models/emotion.rknn",
      "--age-model",
      "rknn:///models/age.rknn",
      "--gender-model",
      "rknn:///models/gender.rknn",
      "--input",
      "gst://camera/dev/video0",
      "--output",
      "gst://display",
    ])
    .expect("参数应当解析成功");

    assert_eq!(args.face_model.scheme(), "rknn");
    assert_eq!(args.input.host_str(), Some("camera"));
    assert_eq!(args.confidence, 0.5);
    assert_eq!(args.frame_number, None);
  }

  #[test]
  fn rejects_missing_model() {
    let result = Args::try_parse_from([
      "mianxiang",
      "--input",
      "image:///a.png",
      "--output",
      "image:///b.png",
    ]);
    assert!(result.is_err());
  }
}
