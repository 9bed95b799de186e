//! Vector overlay drawn above a viewport canvas.
//!
//! Nodes are cached by element id so that a redraw only touches lines whose
//! geometry actually changed.

use std::collections::BTreeMap;

use svg::Document;
use svg::node::element::Line;
use tracing::warn;

use crate::camera::CanvasSize;
use crate::reference_lines::ReferenceLine;

/// Cache of `<line>` nodes for one overlay layer.
#[derive(Debug, Default)]
pub struct SvgLayerCache {
    layer_id: String,
    nodes: BTreeMap<String, ReferenceLine>,
}

/// What an [`SvgLayerCache::update`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerUpdate {
    pub inserted: usize,
    pub updated: usize,
    pub reused: usize,
    pub removed: usize,
}

impl SvgLayerCache {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replaces the layer content with `lines`, keyed `"{layer}-line-{index}"`.
    pub fn update(&mut self, lines: &[ReferenceLine]) -> LayerUpdate {
        let mut stats = LayerUpdate::default();
        let mut next = BTreeMap::new();
        for (index, line) in lines.iter().enumerate() {
            let key = format!("{}-line-{index}", self.layer_id);
            let node = match self.nodes.remove(&key) {
                Some(node) if node == *line => {
                    stats.reused += 1;
                    node
                }
                Some(_) => {
                    stats.updated += 1;
                    line.clone()
                }
                None => {
                    stats.inserted += 1;
                    line.clone()
                }
            };
            next.insert(key, node);
        }
        stats.removed = self.nodes.len();
        self.nodes = next;
        stats
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Serializes the layer as an absolutely positioned, non-interactive
    /// `<svg>` element sized to the canvas.
    pub fn render_svg(&self, canvas: CanvasSize) -> String {
        let document = self.nodes.iter().fold(
            Document::new()
                .set("id", self.layer_id.as_str())
                .set("width", canvas.width)
                .set("height", canvas.height)
                .set(
                    "style",
                    "position:absolute;top:0;left:0;pointer-events:none;z-index:1",
                ),
            |document, (key, line)| {
                document.add(
                    Line::new()
                        .set("id", key.as_str())
                        .set("x1", line.x1)
                        .set("y1", line.y1)
                        .set("x2", line.x2)
                        .set("y2", line.y2)
                        .set("stroke", paint(&line.color))
                        .set("stroke-width", line.stroke_width)
                        .set("stroke-opacity", line.opacity),
                )
            },
        );
        document.to_string()
    }
}

/// Stroke colour for `color`, or `currentColor` when it is not a plain CSS
/// colour (name, hex or functional notation).
fn paint(color: &str) -> &str {
    let plain = !color.is_empty()
        && color
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '#' | '(' | ')' | ',' | '.' | '%' | ' '));
    if plain {
        color
    } else {
        warn!(%color, "Ignoring invalid reference line colour");
        "currentColor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(y: f64) -> ReferenceLine {
        ReferenceLine {
            x1: 0.0,
            y1: y,
            x2: 100.0,
            y2: y,
            color: "cyan".to_string(),
            stroke_width: 1.0,
            opacity: 1.0,
        }
    }

    #[test]
    fn reuses_unchanged_nodes_and_drops_stale_ones() {
        let mut cache = SvgLayerCache::new("vp-1-overlay");
        let first = cache.update(&[line(10.0), line(20.0)]);
        assert_eq!(first.inserted, 2);

        let second = cache.update(&[line(10.0)]);

        assert_eq!(
            second,
            LayerUpdate {
                inserted: 0,
                updated: 0,
                reused: 1,
                removed: 1,
            }
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_geometry_counts_as_update() {
        let mut cache = SvgLayerCache::new("overlay");
        cache.update(&[line(10.0)]);
        let stats = cache.update(&[line(11.0)]);
        assert_eq!(stats.updated, 1);
    }

    #[test]
    fn svg_is_non_interactive_and_contains_every_line() {
        let mut cache = SvgLayerCache::new("overlay");
        cache.update(&[line(10.0), line(50.0)]);

        let svg = cache.render_svg(CanvasSize::new(100.0, 80.0));

        assert!(svg.contains("pointer-events:none"));
        assert!(svg.contains("position:absolute"));
        assert_eq!(svg.matches("<line ").count(), 2);
        assert!(svg.contains("y1=\"50\""));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut hostile = line(10.0);
        hostile.color = "red\" onload=\"alert(1)".to_string();
        let mut cache = SvgLayerCache::new("overlay");
        cache.update(&[hostile]);

        let svg = cache.render_svg(CanvasSize::new(100.0, 80.0));

        assert!(!svg.contains("onload"));
        assert!(svg.contains("currentColor"));
        assert_eq!(svg.matches("<line ").count(), 1);
    }
}
