// 该文件是 Mianxiang （面相） 项目的一部分。
// src/model/rknn.rs - RKNN 模型加载与推理
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

//! RKNN 模型
//!
//! 人脸检测器与三个属性分类器都以 `.rknn` 文件的形式加载。RKNN 文件同时包含
//! 权重与网络结构，均值与缩放在模型转换时固化，因此推理时只需送入
//! [`Blob::as_nhwc`] 的 UInt8 数据。
//!
//! ```no_run
//! use mianxiang::{FromUrl, model::RknnModelBuilder};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("rknn:///opt/models/face_detector.rknn")?;
//! let model = RknnModelBuilder::from_url(&url)?.build()?;
//! # Ok(())
//! # }
//! ```

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  blob::Blob,
  model::{Model, Tensor},
  url_path,
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_OUTPUT_INDEX: usize = 0;

#[derive(Error, Debug)]
pub enum RknnModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("模型为空: {0}")]
  EmptyModel(String),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("获取模型输出失败: {0}")]
  OutputError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl RknnModelError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnModelError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnModel {
  context: Context,
  path: String,
}

pub struct RknnModelBuilder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnModelBuilder {
  type Error = RknnModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(RknnModelBuilder {
      model_path: url_path(url),
      flags: InitFlags::default(),
    })
  }
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnModel, RknnModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    if model_data.is_empty() {
      error!("模型文件为空: {}", self.model_path);
      return Err(RknnModelError::EmptyModel(self.model_path));
    }
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnModelError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnModelError::invalid("无法获取输出数量", e))?;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != RKNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      return Err(RknnModelError::invalid(
        &format!(
          "预期模型输入数量为 {}, 实际为 {}",
          RKNN_NUM_INPUTS, num_inputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    if num_outputs == 0 {
      error!("模型没有任何输出: {}", self.model_path);
      return Err(RknnModelError::EmptyModel(self.model_path));
    }

    info!("模型加载完成: {}", self.model_path);
    Ok(RknnModel {
      context,
      path: self.model_path,
    })
  }
}

impl Model for RknnModel {
  type Error = RknnModelError;

  fn infer(&self, input: &Blob) -> Result<Tensor, Self::Error> {
    debug!(
      "设置模型输入: {}x{} ({})",
      input.width(),
      input.height(),
      self.path
    );
    self
      .context
      .set_input(0, input.as_nhwc(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let data = output.get_f32(RKNN_OUTPUT_INDEX).map_err(|e| {
      error!("获取第 {} 个输出失败: {}", RKNN_OUTPUT_INDEX, e);
      RknnModelError::OutputError(e.to_string())
    })?;
    debug!("模型输出长度: {}", data.len());

    Ok(data.to_vec().into_boxed_slice())
  }
}
