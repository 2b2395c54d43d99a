// 该文件是 Mianxiang （面相） 项目的一部分。
// src/classify.rs - 人脸属性分类与标签融合
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

use std::fmt;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  blob::{Blob, BlobParams},
  model::{Model, Tensor},
};

/// 分类器输出的分数向量，与标签表按下标对齐
pub type ScoreVector = Tensor;

pub const EMOTION_LABELS: [&str; 7] = [
  "Angry", "Disgust", "Fear", "Happy", "Neutral", "Sad", "Surprise",
];

pub const AGE_LABELS: [&str; 8] = [
  "0-2", "3-7", "8-12", "13-20", "20-36", "37-47", "48-55", "56-100",
];

pub const GENDER_LABELS: [&str; 2] = ["Male", "Female"];

/// 人脸属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
  Emotion,
  Age,
  Gender,
}

impl Attribute {
  /// 标注文字的显示顺序：性别、年龄、情绪
  pub const PRESENTATION_ORDER: [Attribute; 3] =
    [Attribute::Gender, Attribute::Age, Attribute::Emotion];

  pub fn as_str(&self) -> &'static str {
    match self {
      Attribute::Emotion => "emotion",
      Attribute::Age => "age",
      Attribute::Gender => "gender",
    }
  }

  /// 内置标签表
  pub fn default_labels(&self) -> LabelTable {
    match self {
      Attribute::Emotion => LabelTable::new(EMOTION_LABELS),
      Attribute::Age => LabelTable::new(AGE_LABELS),
      Attribute::Gender => LabelTable::new(GENDER_LABELS),
    }
  }
}

impl fmt::Display for Attribute {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 有序且不可变的标签表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }
}

/// 一个属性的最终标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedResult {
  pub label: String,
  pub attribute: Attribute,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FuseError {
  #[error("分数向量为空")]
  EmptyScores,
  #[error("分数向量长度 {actual} 与标签表长度 {expected} 不一致")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 取分数最大的下标，相等时取第一个
pub fn argmax(scores: &[f32]) -> Option<usize> {
  if scores.is_empty() {
    return None;
  }

  let mut best_idx = 0usize;
  let mut best = f32::NEG_INFINITY;
  for (idx, &score) in scores.iter().enumerate() {
    if score > best {
      best = score;
      best_idx = idx;
    }
  }
  Some(best_idx)
}

/// 将分数向量融合为标签表中的一个标签
pub fn fuse<'a>(scores: &[f32], labels: &'a LabelTable) -> Result<&'a str, FuseError> {
  if scores.len() != labels.len() {
    if scores.is_empty() {
      return Err(FuseError::EmptyScores);
    }
    return Err(FuseError::LengthMismatch {
      expected: labels.len(),
      actual: scores.len(),
    });
  }

  argmax(scores)
    .and_then(|idx| labels.get(idx))
    .ok_or(FuseError::EmptyScores)
}

#[derive(Error, Debug)]
pub enum ClassifyError<E> {
  #[error("推理错误: {0}")]
  Inference(E),
  #[error("{attribute} 分类器配置错误: {source}")]
  Config { attribute: Attribute, source: FuseError },
  #[error("分类器绑定错误: 期望 {expected}, 实际 {actual}")]
  Misbound { expected: Attribute, actual: Attribute },
}

/// 属性分类能力
pub trait Classifier {
  type Error;

  fn attribute(&self) -> Attribute;

  fn labels(&self) -> &LabelTable;

  /// 对裁剪后的人脸区域计算原始分数
  fn scores(&self, region: &RgbImage) -> Result<ScoreVector, Self::Error>;

  fn classify(&self, region: &RgbImage) -> Result<FusedResult, ClassifyError<Self::Error>> {
    let scores = self.scores(region).map_err(ClassifyError::Inference)?;
    let label = fuse(&scores, self.labels()).map_err(|source| ClassifyError::Config {
      attribute: self.attribute(),
      source,
    })?;
    Ok(FusedResult {
      label: label.to_string(),
      attribute: self.attribute(),
    })
  }
}

/// 一个分类模型与其标签表的绑定
pub struct AttributeClassifier<M> {
  attribute: Attribute,
  model: M,
  labels: LabelTable,
  params: BlobParams,
}

impl<M: Model> AttributeClassifier<M> {
  /// 绑定模型与标签表
  ///
  /// 以全零输入做一次前向计算，输出长度必须与标签表一致。
  pub fn bind(
    attribute: Attribute,
    model: M,
    labels: LabelTable,
  ) -> Result<Self, ClassifyError<M::Error>> {
    Self::bind_with_params(attribute, model, labels, BlobParams::ATTRIBUTE_CLASSIFIER)
  }

  pub fn bind_with_params(
    attribute: Attribute,
    model: M,
    labels: LabelTable,
    params: BlobParams,
  ) -> Result<Self, ClassifyError<M::Error>> {
    if labels.is_empty() {
      error!("{} 分类器的标签表为空", attribute);
      return Err(ClassifyError::Config {
        attribute,
        source: FuseError::EmptyScores,
      });
    }

    let trial = model
      .infer(&Blob::zeros(params))
      .map_err(ClassifyError::Inference)?;
    if trial.len() != labels.len() {
      error!(
        "{} 分类器输出长度 {} 与标签表长度 {} 不一致",
        attribute,
        trial.len(),
        labels.len()
      );
      let source = if trial.is_empty() {
        FuseError::EmptyScores
      } else {
        FuseError::LengthMismatch {
          expected: labels.len(),
          actual: trial.len(),
        }
      };
      return Err(ClassifyError::Config { attribute, source });
    }

    info!("{} 分类器已绑定 {} 个标签", attribute, labels.len());
    Ok(Self {
      attribute,
      model,
      labels,
      params,
    })
  }
}

impl<M: Model> Classifier for AttributeClassifier<M> {
  type Error = M::Error;

  fn attribute(&self) -> Attribute {
    self.attribute
  }

  fn labels(&self) -> &LabelTable {
    &self.labels
  }

  fn scores(&self, region: &RgbImage) -> Result<ScoreVector, Self::Error> {
    let blob = Blob::from_image(region, self.params);
    let scores = self.model.infer(&blob)?;
    debug!("{} 分数: {:?}", self.attribute, scores);
    Ok(scores)
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, convert::Infallible};

  use image::Rgb;

  use super::*;

  struct FixedModel {
    output: Vec<f32>,
    calls: Cell<usize>,
  }

  impl FixedModel {
    fn new(output: &[f32]) -> Self {
      Self {
        output: output.to_vec(),
        calls: Cell::new(0),
      }
    }
  }

  impl Model for FixedModel {
    type Error = Infallible;

    fn infer(&self, input: &Blob) -> Result<Tensor, Self::Error> {
      assert_eq!((input.width(), input.height()), (227, 227));
      self.calls.set(self.calls.get() + 1);
      Ok(self.output.clone().into_boxed_slice())
    }
  }

  #[test]
  fn fuse_picks_highest_score() {
    let table = LabelTable::new(["A", "B", "C"]);
    assert_eq!(fuse(&[0.1, 0.9, 0.3], &table), Ok("B"));
  }

  #[test]
  fn fuse_ties_resolve_to_first() {
    let table = LabelTable::new(["X", "Y"]);
    assert_eq!(fuse(&[0.5, 0.5], &table), Ok("X"));
  }

  #[test]
  fn fuse_rejects_empty_and_mismatched_scores() {
    let table = LabelTable::new(["X", "Y"]);
    assert_eq!(fuse(&[], &table), Err(FuseError::EmptyScores));
    assert_eq!(
      fuse(&[0.1, 0.2, 0.3], &table),
      Err(FuseError::LengthMismatch {
        expected: 2,
        actual: 3
      })
    );
  }

  #[test]
  fn argmax_skips_nan() {
    assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn builtin_tables_have_expected_sizes() {
    assert_eq!(Attribute::Emotion.default_labels().len(), 7);
    assert_eq!(Attribute::Age.default_labels().len(), 8);
    assert_eq!(Attribute::Gender.default_labels().len(), 2);
    assert_eq!(Attribute::Age.default_labels().get(4), Some("20-36"));
  }

  #[test]
  fn bind_checks_output_length() {
    let model = FixedModel::new(&[0.0; 7]);
    let classifier =
      AttributeClassifier::bind(Attribute::Emotion, model, Attribute::Emotion.default_labels());
    assert!(classifier.is_ok());
  }

  #[test]
  fn bind_rejects_mismatched_model() {
    let model = FixedModel::new(&[0.2, 0.8]);
    let result = AttributeClassifier::bind(Attribute::Age, model, Attribute::Age.default_labels());

    match result {
      Err(ClassifyError::Config { attribute, source }) => {
        assert_eq!(attribute, Attribute::Age);
        assert_eq!(
          source,
          FuseError::LengthMismatch {
            expected: 8,
            actual: 2
          }
        );
      }
      _ => panic!("应当返回配置错误"),
    }
  }

  #[test]
  fn bind_rejects_empty_output_and_empty_table() {
    let empty_output =
      AttributeClassifier::bind(Attribute::Gender, FixedModel::new(&[]), Attribute::Gender.default_labels());
    assert!(matches!(
      empty_output,
      Err(ClassifyError::Config {
        source: FuseError::EmptyScores,
        ..
      })
    ));

    let empty_table = AttributeClassifier::bind(
      Attribute::Gender,
      FixedModel::new(&[0.1]),
      LabelTable::new(Vec::<String>::new()),
    );
    assert!(matches!(empty_table, Err(ClassifyError::Config { .. })));
  }

  #[test]
  fn classify_returns_fused_label() {
    let model = FixedModel::new(&[0.3, 0.7]);
    let classifier =
      AttributeClassifier::bind(Attribute::Gender, model, Attribute::Gender.default_labels())
        .expect("绑定应当成功");
    let region = RgbImage::from_pixel(40, 40, Rgb([90, 90, 90]));

    let result = classifier.classify(&region).expect("分类应当成功");

    assert_eq!(
      result,
      FusedResult {
        label: "Female".to_string(),
        attribute: Attribute::Gender,
      }
    );
    assert_eq!(classifier.model.calls.get(), 2);
  }
}
