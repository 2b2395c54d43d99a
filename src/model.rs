// 该文件是 Mianxiang （面相） 项目的一部分。
// src/model.rs - 模型
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

use crate::blob::Blob;

/// 模型原始输出，按下标直接访问
pub type Tensor = Box<[f32]>;

/// 推理引擎的前向计算
///
/// 输入为预处理后的 [`Blob`]，输出为第一个输出层的扁平张量。
pub trait Model {
  type Error;

  fn infer(&self, input: &Blob) -> Result<Tensor, Self::Error>;
}

impl<M: Model + ?Sized> Model for Box<M> {
  type Error = M::Error;

  fn infer(&self, input: &Blob) -> Result<Tensor, Self::Error> {
    (**self).infer(input)
  }
}

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnModel, RknnModelBuilder, RknnModelError};
