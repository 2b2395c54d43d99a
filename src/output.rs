// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output.rs - 输出定义
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
#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
use thiserror::Error;
#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
use url::Url;

use crate::{annotate::FaceAnnotation, detection::BoundingBox, frame::Frame, layout::Anchor};
#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
use crate::{FromUrl, FromUrlWithScheme};

/// 绘制原语
pub trait Canvas {
  fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox);
  /// `anchor` 为文字基线的起点
  fn draw_text(&self, image: &mut RgbImage, text: &str, anchor: Anchor);
  /// 以固定字号测量文字高度
  fn text_height(&self, text: &str) -> u32;
}

/// 标注结果的呈现端
pub trait Render: Canvas {
  type Error;

  /// 呈现已经绘制好标注的帧
  fn render_result(&self, frame: &Frame, faces: &[FaceAnnotation]) -> Result<(), Self::Error>;

  /// 用户是否请求停止
  fn poll_stop(&self) -> bool {
    false
  }
}

/// 为持有 [`Draw`] 的输出实现 [`Canvas`]
#[allow(unused_macros)]
macro_rules! delegate_canvas {
  ($output:ty) => {
    impl $crate::output::Canvas for $output {
      fn draw_box(
        &self,
        image: &mut ::image::RgbImage,
        bbox: &$crate::detection::BoundingBox,
      ) {
        self.draw().draw_box(image, bbox)
      }

      fn draw_text(&self, image: &mut ::image::RgbImage, text: &str, anchor: $crate::layout::Anchor) {
        self.draw().draw_text(image, text, anchor)
      }

      fn text_height(&self, text: &str) -> u32 {
        self.draw().text_height(text)
      }
    }
  };
}
#[allow(unused_imports)]
pub(crate) use delegate_canvas;

#[cfg(feature = "draw")]
pub mod draw;
#[cfg(feature = "draw")]
pub use self::draw::{Draw, DrawError};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => {
        let output = GStreamerVideoOutput::from_url(url)?;
        Ok(OutputWrapper::GStreamerVideoOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
impl OutputWrapper {
  fn draw(&self) -> &Draw {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.draw(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.draw(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.draw(),
    }
  }
}

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
delegate_canvas!(OutputWrapper);

#[cfg(any(
  feature = "save_image_file",
  feature = "gstreamer_output",
  feature = "directory_record"
))]
impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, faces: &[FaceAnnotation]) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, faces)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output
        .render_result(frame, faces)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, faces)
        .map_err(OutputError::from),
    }
  }

  fn poll_stop(&self) -> bool {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.poll_stop(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.poll_stop(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.poll_stop(),
    }
  }
}
