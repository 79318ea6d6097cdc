// 该文件是 Mianxiang （面相） 项目的一部分。
// src/cascade/xml.rs - 级联 XML 解析
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

use std::str::FromStr;

use roxmltree::{Document, Node};

use super::{
  CascadeError, DecisionNode, Features, HaarFeature, LbpFeature, NativeCascade, Split, Stage,
  WeakClassifier, WeightedRect,
};

fn format_err<S: Into<String>>(msg: S) -> CascadeError {
  CascadeError::Format(msg.into())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
  node
    .children()
    .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn require<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
  child(node, name).ok_or_else(|| format_err(format!("缺少 <{}>", name)))
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
  node.children().filter(|n| n.is_element())
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
  node.text().map(str::trim).unwrap_or("")
}

fn parse_value<T: FromStr>(node: Node, name: &str) -> Result<T, CascadeError> {
  let raw = text(require(node, name)?);
  raw
    .parse()
    .map_err(|_| format_err(format!("<{}> 的值无效: '{}'", name, raw)))
}

fn parse_list<T: FromStr>(raw: &str, what: &str) -> Result<Vec<T>, CascadeError> {
  raw
    .split_whitespace()
    .map(|tok| {
      tok
        .parse()
        .map_err(|_| format_err(format!("{} 中的数值无效: '{}'", what, tok)))
    })
    .collect()
}

pub(super) fn parse_cascade(text_in: &str) -> Result<NativeCascade, CascadeError> {
  let doc = Document::parse(text_in)?;
  let root = doc.root_element();
  if root.tag_name().name() != "opencv_storage" {
    return Err(format_err("根节点不是 <opencv_storage>"));
  }
  let cascade = elements(root)
    .next()
    .ok_or_else(|| format_err("<opencv_storage> 为空"))?;

  if child(cascade, "stageType").is_none() {
    return Err(CascadeError::Unsupported(
      "旧版级联格式（缺少 stageType）".to_string(),
    ));
  }
  let stage_type = text(require(cascade, "stageType")?);
  if stage_type != "BOOST" {
    return Err(CascadeError::Unsupported(format!("stageType {}", stage_type)));
  }

  let lbp = match text(require(cascade, "featureType")?) {
    "HAAR" => false,
    "LBP" => true,
    other => return Err(CascadeError::Unsupported(format!("featureType {}", other))),
  };

  let width: u32 = parse_value(cascade, "width")?;
  let height: u32 = parse_value(cascade, "height")?;
  if width == 0 || height == 0 {
    return Err(format_err("窗口尺寸为 0"));
  }

  let stages = parse_stages(require(cascade, "stages")?, lbp)?;
  if stages.is_empty() {
    return Err(format_err("没有任何级"));
  }

  let features_node = require(cascade, "features")?;
  let features = if lbp {
    Features::Lbp(parse_lbp_features(features_node, width, height)?)
  } else {
    Features::Haar(parse_haar_features(features_node, width, height)?)
  };

  let feature_count = match &features {
    Features::Haar(f) => f.len(),
    Features::Lbp(f) => f.len(),
  };
  let out_of_range = stages
    .iter()
    .flat_map(|s| &s.weak)
    .flat_map(|w| &w.nodes)
    .any(|n| n.feature >= feature_count);
  if out_of_range {
    return Err(format_err("节点引用了不存在的特征"));
  }

  Ok(NativeCascade {
    window: (width, height),
    stages,
    features,
  })
}

fn parse_stages(node: Node, lbp: bool) -> Result<Vec<Stage>, CascadeError> {
  elements(node)
    .map(|stage| {
      let threshold: f32 = parse_value(stage, "stageThreshold")?;
      let weak = elements(require(stage, "weakClassifiers")?)
        .map(|weak| parse_weak(weak, lbp))
        .collect::<Result<Vec<_>, _>>()?;
      if weak.is_empty() {
        return Err(format_err("级中没有弱分类器"));
      }
      Ok(Stage { threshold, weak })
    })
    .collect()
}

fn parse_weak(node: Node, lbp: bool) -> Result<WeakClassifier, CascadeError> {
  let leaves: Vec<f32> = parse_list(text(require(node, "leafValues")?), "leafValues")?;
  let raw = text(require(node, "internalNodes")?);

  let nodes: Vec<DecisionNode> = if lbp {
    let values: Vec<i64> = parse_list(raw, "internalNodes")?;
    if values.is_empty() || values.len() % 11 != 0 {
      return Err(format_err("LBP 节点长度应为 11 的倍数"));
    }
    values
      .chunks(11)
      .map(|c| {
        let mut subset = [0u32; 8];
        for (dst, src) in subset.iter_mut().zip(&c[3..]) {
          *dst = *src as i32 as u32;
        }
        DecisionNode {
          left: c[0] as i32,
          right: c[1] as i32,
          feature: c[2].max(0) as usize,
          split: Split::Subset(subset),
        }
      })
      .collect()
  } else {
    let values: Vec<f64> = parse_list(raw, "internalNodes")?;
    if values.is_empty() || values.len() % 4 != 0 {
      return Err(format_err("HAAR 节点长度应为 4 的倍数"));
    }
    values
      .chunks(4)
      .map(|c| DecisionNode {
        left: c[0] as i32,
        right: c[1] as i32,
        feature: c[2].max(0.0) as usize,
        split: Split::Threshold(c[3] as f32),
      })
      .collect()
  };

  for n in &nodes {
    for next in [n.left, n.right] {
      let valid = if next <= 0 {
        ((-next) as usize) < leaves.len()
      } else {
        (next as usize) < nodes.len()
      };
      if !valid {
        return Err(format_err(format!("节点索引越界: {}", next)));
      }
    }
  }

  Ok(WeakClassifier { nodes, leaves })
}

fn parse_haar_features(node: Node, width: u32, height: u32) -> Result<Vec<HaarFeature>, CascadeError> {
  let (win_w, win_h) = (width as i32, height as i32);
  elements(node)
    .map(|feature| {
      let tilted = match child(feature, "tilted") {
        Some(t) => text(t) != "0",
        None => false,
      };
      let rects = elements(require(feature, "rects")?)
        .map(|r| {
          let v: Vec<f64> = parse_list(text(r), "rects")?;
          if v.len() != 5 {
            return Err(format_err("HAAR 矩形应为 x y w h weight"));
          }
          let rect = WeightedRect {
            x: v[0] as i32,
            y: v[1] as i32,
            width: v[2] as i32,
            height: v[3] as i32,
            weight: v[4] as f32,
          };
          let inside = if tilted {
            rect.x - rect.height >= 0
              && rect.x + rect.width <= win_w
              && rect.y >= 0
              && rect.y + rect.width + rect.height <= win_h
          } else {
            rect.x >= 0
              && rect.y >= 0
              && rect.x + rect.width <= win_w
              && rect.y + rect.height <= win_h
          };
          if rect.width < 0 || rect.height < 0 || !inside {
            return Err(format_err("HAAR 矩形超出检测窗口"));
          }
          Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(HaarFeature { rects, tilted })
    })
    .collect()
}

fn parse_lbp_features(node: Node, width: u32, height: u32) -> Result<Vec<LbpFeature>, CascadeError> {
  elements(node)
    .map(|feature| {
      let v: Vec<i32> = parse_list(text(require(feature, "rect")?), "rect")?;
      if v.len() != 4 {
        return Err(format_err("LBP 矩形应为 x y w h"));
      }
      let f = LbpFeature {
        x: v[0],
        y: v[1],
        width: v[2],
        height: v[3],
      };
      if f.x < 0
        || f.y < 0
        || f.width <= 0
        || f.height <= 0
        || f.x + 3 * f.width > width as i32
        || f.y + 3 * f.height > height as i32
      {
        return Err(format_err("LBP 特征超出检测窗口"));
      }
      Ok(f)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cascade::tests::{BRIGHT_CENTER_HAAR, BRIGHT_CENTER_LBP};

  #[test]
  fn parses_stump_node() {
    let classifier = parse_cascade(BRIGHT_CENTER_HAAR).unwrap();
    let weak = &classifier.stages[0].weak[0];
    assert_eq!(weak.nodes.len(), 1);
    assert_eq!(weak.nodes[0].left, 0);
    assert_eq!(weak.nodes[0].right, -1);
    assert_eq!(weak.leaves, vec![-1.0, 1.0]);
    match &classifier.features {
      Features::Haar(f) => {
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].rects.len(), 2);
        assert!(!f[0].tilted);
      }
      Features::Lbp(_) => panic!("expected HAAR features"),
    }
  }

  #[test]
  fn parses_lbp_subset() {
    let classifier = parse_cascade(BRIGHT_CENTER_LBP).unwrap();
    match classifier.stages[0].weak[0].nodes[0].split {
      Split::Subset(subset) => {
        assert_eq!(subset[0], 0xFFFF_FFFE);
        assert_eq!(subset[7], 0xFFFF_FFFF);
      }
      Split::Threshold(_) => panic!("expected subset split"),
    }
  }

  #[test]
  fn rejects_non_cascade_xml() {
    assert!(matches!(
      parse_cascade("<root/>"),
      Err(CascadeError::Format(_))
    ));
    assert!(matches!(parse_cascade("not xml"), Err(CascadeError::Xml(_))));
  }

  #[test]
  fn rejects_legacy_format() {
    let legacy = "<opencv_storage><face type_id=\"opencv-haar-classifier\"><size>24 24</size></face></opencv_storage>";
    assert!(matches!(
      parse_cascade(legacy),
      Err(CascadeError::Unsupported(_))
    ));
  }

  #[test]
  fn rejects_dangling_feature_index() {
    let broken = BRIGHT_CENTER_HAAR.replace("0 -1 0 1.0000000000000000e-01", "0 -1 3 1.0000000000000000e-01");
    assert!(matches!(parse_cascade(&broken), Err(CascadeError::Format(_))));
  }

  #[test]
  fn rejects_rect_outside_window() {
    let broken = BRIGHT_CENTER_HAAR.replace("2 2 4 4 4.", "6 6 4 4 4.");
    assert!(matches!(parse_cascade(&broken), Err(CascadeError::Format(_))));
  }
}
