// 该文件是 Mianxiang （面相） 项目的一部分。
// src/layout.rs - 标注文字排版
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

use crate::detection::BoundingBox;

/// 文字锚点，对应文字基线的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
  pub x: i32,
  pub y: i32,
}

/// 计算标签在检测框右侧自上而下的锚点
///
/// 第 `i` 个标签位于 `(right, top + (i + 1) * line_height(label))`。
pub fn layout_labels<S, F>(bbox: &BoundingBox, labels: &[S], mut line_height: F) -> Vec<Anchor>
where
  S: AsRef<str>,
  F: FnMut(&str) -> u32,
{
  labels
    .iter()
    .enumerate()
    .map(|(idx, label)| Anchor {
      x: bbox.right,
      y: bbox.top + (idx as i32 + 1) * line_height(label.as_ref()) as i32,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_stack_below_top_right_corner() {
    let bbox = BoundingBox::new(100, 50, 200, 150);

    let anchors = layout_labels(&bbox, &["Male", "20-36", "Happy"], |_| 20);

    assert_eq!(
      anchors,
      vec![
        Anchor { x: 200, y: 70 },
        Anchor { x: 200, y: 90 },
        Anchor { x: 200, y: 110 },
      ]
    );
  }

  #[test]
  fn line_height_is_measured_per_label() {
    let bbox = BoundingBox::new(0, 10, 30, 40);
    let mut measured = Vec::new();

    let anchors = layout_labels(&bbox, &["a", "bb"], |text| {
      measured.push(text.to_string());
      text.len() as u32 * 10
    });

    assert_eq!(measured, vec!["a", "bb"]);
    assert_eq!(anchors, vec![Anchor { x: 30, y: 20 }, Anchor { x: 30, y: 50 }]);
  }

  #[test]
  fn no_labels_no_anchors() {
    let bbox = BoundingBox::new(1, 1, 2, 2);
    assert!(layout_labels::<&str, _>(&bbox, &[], |_| 12).is_empty());
  }
}
