// 该文件是 Mianxiang （面相） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 窗口与视频文件输出
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

//! # GStreamer 视频输出模块
//!
//! 将标注后的帧送入 GStreamer 管道，既可以在窗口中实时显示，
//! 也可以编码保存为视频文件。
//!
//! ## URL Scheme
//!
//! - `gst://display` 使用 `autovideosink` 在窗口中显示
//! - `gst:///output.mp4?fps=30` 保存为视频文件，支持 mp4、mkv、avi、webm
//!
//! 帧尺寸在收到第一帧时确定。窗口被关闭或管道出错时，
//! [`Render::poll_stop`] 返回 `true`，主循环随之停止。
//!
//! ```no_run
//! use mianxiang::{FromUrl, output::GStreamerVideoOutput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://display?font=/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")?;
//! let output = GStreamerVideoOutput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  annotate::FaceAnnotation,
  frame::Frame,
  output::{Render, draw::{Draw, DrawError}},
  url_path, url_query,
};

const DISPLAY_HOST: &str = "display";
const DEFAULT_FPS: i32 = 30;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 字体加载错误
  #[error("Font error: {0}")]
  DrawError(#[from] DrawError),
}

struct StreamState {
  frame_count: u64,
  dimensions: Option<(u32, u32)>,
}

/// GStreamer 视频输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: i32,
  state: Mutex<StreamState>,
  draw: Draw,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

fn pipeline_description(url: &Url) -> String {
  if url.host_str() == Some(DISPLAY_HOST) {
    return "appsrc name=src is-live=true ! videoconvert ! autovideosink sync=false".to_string();
  }

  let file_path = url_path(url);
  let encoder = if file_path.ends_with(".mkv") {
    "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
  } else if file_path.ends_with(".avi") {
    "video/x-raw,format=I420 ! x264enc ! avimux"
  } else if file_path.ends_with(".webm") {
    "vp8enc ! webmmux"
  } else {
    // 默认为 MP4
    "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
  };

  format!(
    "appsrc name=src ! videoconvert ! {} ! filesink location={}",
    encoder, file_path
  )
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    // Initialize GStreamer (subsequent calls are safe no-ops)
    gst::init()?;

    let fps: i32 = url_query(url, "fps")
      .and_then(|v| v.parse().ok())
      .unwrap_or(DEFAULT_FPS);
    let draw = Draw::from_url(url)?;

    let pipeline_desc = pipeline_description(url);
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("Video output initialized @ {} fps", fps);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      fps,
      state: Mutex::new(StreamState {
        frame_count: 0,
        dimensions: None,
      }),
      draw,
    })
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    // Send EOS to properly close the file
    let _ = self.appsrc.end_of_stream();

    if let Some(bus) = self.pipeline.bus() {
      let _ = bus.timed_pop_filtered(
        gst::ClockTime::from_mseconds(500),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    let frame_count = self
      .state
      .lock()
      .map(|state| state.frame_count)
      .unwrap_or_default();
    info!("Video output closed. Total frames written: {}", frame_count);
  }
}

impl GStreamerVideoOutput {
  pub(crate) fn draw(&self) -> &Draw {
    &self.draw
  }

  fn push_frame(&self, width: u32, height: u32, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut state = self
      .state
      .lock()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("State lock poisoned".to_string()))?;

    if state.dimensions != Some((width, height)) {
      let caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(self.fps, 1))
        .build();
      self.appsrc.set_caps(Some(&caps));
      info!("Video output caps: {}x{} @ {} fps", width, height, self.fps);
      state.dimensions = Some((width, height));
    }

    let mut buffer = gst::Buffer::from_mut_slice(data.to_vec());
    let timestamp = (state.frame_count * 1_000_000_000) / (self.fps as u64);
    state.frame_count += 1;

    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(
        1_000_000_000 / self.fps as u64,
      ));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }
}

crate::output::delegate_canvas!(GStreamerVideoOutput);

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&self, frame: &Frame, _faces: &[FaceAnnotation]) -> Result<(), Self::Error> {
    self.push_frame(frame.width(), frame.height(), frame.image.as_raw())
  }

  fn poll_stop(&self) -> bool {
    let Some(bus) = self.pipeline.bus() else {
      return false;
    };

    match bus.pop_filtered(&[gst::MessageType::Eos, gst::MessageType::Error]) {
      Some(msg) => {
        match msg.view() {
          gst::MessageView::Error(err) => warn!("输出管道错误，停止处理: {}", err.error()),
          _ => info!("输出管道已结束"),
        }
        true
      }
      None => false,
    }
  }
}
