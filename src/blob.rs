// 该文件是 Mianxiang （面相） 项目的一部分。
// src/blob.rs - 模型输入张量预处理
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

const BLOB_CHANNELS: usize = 3;

/// 模型期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Rgb,
  Bgr,
}

/// 预处理参数
///
/// `mean` 按模型通道顺序给出。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobParams {
  pub width: u32,
  pub height: u32,
  pub mean: [f32; 3],
  pub scale: f32,
  pub order: ChannelOrder,
}

impl BlobParams {
  /// 人脸检测器输入：300x300，BGR 均值 (104, 177, 123)
  pub const FACE_DETECTOR: BlobParams = BlobParams {
    width: 300,
    height: 300,
    mean: [104.0, 177.0, 123.0],
    scale: 1.0,
    order: ChannelOrder::Bgr,
  };

  /// 属性分类器输入：227x227，均值为 0
  pub const ATTRIBUTE_CLASSIFIER: BlobParams = BlobParams {
    width: 227,
    height: 227,
    mean: [0.0, 0.0, 0.0],
    scale: 1.0,
    order: ChannelOrder::Bgr,
  };
}

/// 缩放后的模型输入
#[derive(Debug, Clone)]
pub struct Blob {
  params: BlobParams,
  // NHWC, 模型通道顺序
  pixels: Box<[u8]>,
}

impl Blob {
  pub fn from_image(image: &RgbImage, params: BlobParams) -> Self {
    let resized = imageops::resize(
      image,
      params.width,
      params.height,
      imageops::FilterType::Triangle,
    );
    Self::from_resized(resized.as_raw(), params)
  }

  /// 全零输入，用于启动时探测模型输出
  pub fn zeros(params: BlobParams) -> Self {
    let size = BLOB_CHANNELS * params.width as usize * params.height as usize;
    Self {
      params,
      pixels: vec![0u8; size].into_boxed_slice(),
    }
  }

  fn from_resized(rgb: &[u8], params: BlobParams) -> Self {
    let pixels = match params.order {
      ChannelOrder::Rgb => rgb.to_vec(),
      ChannelOrder::Bgr => rgb
        .chunks_exact(BLOB_CHANNELS)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect(),
    };

    Self {
      params,
      pixels: pixels.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.params.width
  }

  pub fn height(&self) -> u32 {
    self.params.height
  }

  /// 未归一化的 NHWC 字节
  pub fn as_nhwc(&self) -> &[u8] {
    &self.pixels
  }

  /// 减均值并缩放后的 NCHW 浮点张量，按需计算
  pub fn to_nchw(&self) -> Vec<f32> {
    let plane = self.params.width as usize * self.params.height as usize;
    let mut tensor = vec![0f32; plane * BLOB_CHANNELS];

    for (idx, px) in self.pixels.chunks_exact(BLOB_CHANNELS).enumerate() {
      for (c, &value) in px.iter().enumerate() {
        tensor[c * plane + idx] = (value as f32 - self.params.mean[c]) * self.params.scale;
      }
    }
    tensor
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn bgr_blob_reorders_and_subtracts_mean() {
    let image = RgbImage::from_pixel(4, 4, Rgb([10, 200, 130]));
    let params = BlobParams {
      width: 2,
      height: 2,
      ..BlobParams::FACE_DETECTOR
    };

    let blob = Blob::from_image(&image, params);

    assert_eq!(&blob.as_nhwc()[..3], &[130, 200, 10]);
    let tensor = blob.to_nchw();
    assert_eq!(tensor.len(), 12);
    assert_eq!(tensor[0], 130.0 - 104.0);
    assert_eq!(tensor[4], 200.0 - 177.0);
    assert_eq!(tensor[8], 10.0 - 123.0);
  }

  #[test]
  fn classifier_blob_has_fixed_size_and_zero_mean() {
    let image = RgbImage::from_pixel(40, 31, Rgb([1, 2, 3]));

    let blob = Blob::from_image(&image, BlobParams::ATTRIBUTE_CLASSIFIER);

    assert_eq!((blob.width(), blob.height()), (227, 227));
    assert_eq!(blob.as_nhwc().len(), 227 * 227 * 3);
    assert_eq!(blob.to_nchw()[0], 3.0);
  }

  #[test]
  fn zero_blob_matches_shape() {
    let blob = Blob::zeros(BlobParams::ATTRIBUTE_CLASSIFIER);
    assert_eq!(blob.to_nchw().len(), 3 * 227 * 227);
    assert!(blob.as_nhwc().iter().all(|&v| v == 0));
  }
}
