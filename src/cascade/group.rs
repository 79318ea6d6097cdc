// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cascade/group.rs - 检测框聚类合并
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

use crate::frame::FaceRect;

fn similar(a: &FaceRect, b: &FaceRect, eps: f64) -> bool {
  let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
  (a.x - b.x).abs() as f64 <= delta
    && (a.y - b.y).abs() as f64 <= delta
    && (a.x + a.width - b.x - b.width).abs() as f64 <= delta
    && (a.y + a.height - b.y - b.height).abs() as f64 <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
  while parent[i] != i {
    parent[i] = parent[parent[i]];
    i = parent[i];
  }
  i
}

/// 等价类划分，类编号按首次出现的顺序分配
fn partition(rects: &[FaceRect], eps: f64) -> (Vec<usize>, usize) {
  let n = rects.len();
  let mut parent: Vec<usize> = (0..n).collect();
  for i in 0..n {
    for j in i + 1..n {
      if similar(&rects[i], &rects[j], eps) {
        let (a, b) = (find(&mut parent, i), find(&mut parent, j));
        if a != b {
          parent[b] = a;
        }
      }
    }
  }

  let mut class_of_root = vec![usize::MAX; n];
  let mut labels = vec![0usize; n];
  let mut classes = 0;
  for i in 0..n {
    let root = find(&mut parent, i);
    if class_of_root[root] == usize::MAX {
      class_of_root[root] = classes;
      classes += 1;
    }
    labels[i] = class_of_root[root];
  }
  (labels, classes)
}

/// 把相近的候选框聚成一类取平均，丢掉成员数不超过 `group_threshold` 的类，
/// 再去掉被更强的类包住的小框。`group_threshold` 为 0 时原样返回。
pub fn group_rectangles(rects: &[FaceRect], group_threshold: u32, eps: f64) -> Vec<FaceRect> {
  if group_threshold == 0 || rects.is_empty() {
    return rects.to_vec();
  }

  let (labels, classes) = partition(rects, eps);
  let mut sums = vec![[0i64; 4]; classes];
  let mut counts = vec![0u32; classes];
  for (rect, &label) in rects.iter().zip(&labels) {
    let s = &mut sums[label];
    s[0] += rect.x as i64;
    s[1] += rect.y as i64;
    s[2] += rect.width as i64;
    s[3] += rect.height as i64;
    counts[label] += 1;
  }

  let averaged: Vec<(FaceRect, u32)> = sums
    .iter()
    .zip(&counts)
    .map(|(s, &n)| {
      let avg = |v: i64| (v as f64 / n as f64).round() as i32;
      (FaceRect::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3])), n)
    })
    .collect();

  let mut grouped = Vec::new();
  for (i, &(r1, n1)) in averaged.iter().enumerate() {
    if n1 <= group_threshold {
      continue;
    }
    let nested = averaged.iter().enumerate().any(|(j, &(r2, n2))| {
      if j == i || n2 <= group_threshold {
        return false;
      }
      let dx = (r2.width as f64 * eps).round() as i32;
      let dy = (r2.height as f64 * eps).round() as i32;
      r1.x >= r2.x - dx
        && r1.y >= r2.y - dy
        && r1.x + r1.width <= r2.x + r2.width + dx
        && r1.y + r1.height <= r2.y + r2.height + dy
        && (n2 > n1.max(3) || n1 < 3)
    });
    if !nested {
      grouped.push(r1);
    }
  }
  grouped
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_threshold_returns_input() {
    let rects = vec![FaceRect::new(0, 0, 10, 10), FaceRect::new(1, 1, 10, 10)];
    assert_eq!(group_rectangles(&rects, 0, 0.2), rects);
  }

  #[test]
  fn close_rects_are_averaged() {
    let rects = vec![
      FaceRect::new(10, 10, 40, 40),
      FaceRect::new(12, 10, 40, 40),
      FaceRect::new(11, 13, 40, 40),
      FaceRect::new(200, 200, 40, 40),
    ];
    let grouped = group_rectangles(&rects, 1, 0.2);
    assert_eq!(grouped, vec![FaceRect::new(11, 11, 40, 40)]);
  }

  #[test]
  fn weak_clusters_are_dropped() {
    let rects = vec![FaceRect::new(10, 10, 40, 40), FaceRect::new(11, 10, 40, 40)];
    assert!(group_rectangles(&rects, 2, 0.2).is_empty());
    assert_eq!(group_rectangles(&rects, 1, 0.2).len(), 1);
  }

  #[test]
  fn nested_weak_cluster_is_removed() {
    let mut rects = vec![FaceRect::new(100, 100, 80, 80); 5];
    rects.push(FaceRect::new(120, 120, 20, 20));
    rects.push(FaceRect::new(121, 120, 20, 20));
    let grouped = group_rectangles(&rects, 1, 0.2);
    assert_eq!(grouped, vec![FaceRect::new(100, 100, 80, 80)]);
  }

  #[test]
  fn separate_strong_clusters_survive() {
    let mut rects = vec![FaceRect::new(0, 0, 30, 30); 3];
    rects.extend(vec![FaceRect::new(100, 0, 30, 30); 3]);
    let grouped = group_rectangles(&rects, 2, 0.2);
    assert_eq!(grouped.len(), 2);
  }
}
