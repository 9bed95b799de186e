//! Screen-space lines showing where one viewport's slice plane cuts another.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::enums::Orientation;
use crate::transform::{screen_to_world, world_to_screen};
use crate::viewport::Viewport;

/// A segment in target-canvas pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub color: String,
    pub stroke_width: f64,
    pub opacity: f64,
}

/// Colours are keyed by the orientation of the viewport the line comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLineStyle {
    pub axial_color: String,
    pub coronal_color: String,
    pub sagittal_color: String,
    pub stroke_width: f64,
    pub opacity: f64,
}

impl Default for ReferenceLineStyle {
    fn default() -> Self {
        Self {
            axial_color: "cyan".to_string(),
            coronal_color: "yellow".to_string(),
            sagittal_color: "lime".to_string(),
            stroke_width: 1.5,
            opacity: 0.8,
        }
    }
}

impl ReferenceLineStyle {
    pub fn color_for(&self, orientation: Orientation) -> &str {
        match orientation {
            Orientation::Axial => &self.axial_color,
            Orientation::Coronal => &self.coronal_color,
            Orientation::Sagittal => &self.sagittal_color,
        }
    }
}

/// Axis held constant along the intersection line (the active plane's
/// normal) and axis the line runs along, for each orientation pair.
fn intersection_axes(active: Orientation, target: Orientation) -> Option<(usize, usize)> {
    match (active, target) {
        (Orientation::Axial, Orientation::Coronal) => Some((2, 0)),
        (Orientation::Axial, Orientation::Sagittal) => Some((2, 1)),
        (Orientation::Coronal, Orientation::Axial) => Some((1, 0)),
        (Orientation::Coronal, Orientation::Sagittal) => Some((1, 2)),
        (Orientation::Sagittal, Orientation::Axial) => Some((0, 1)),
        (Orientation::Sagittal, Orientation::Coronal) => Some((0, 2)),
        _ => None,
    }
}

/// Computes where `active`'s current slice plane intersects `target`'s slice,
/// in `target` canvas pixels.
///
/// Returns no lines when both are the same viewport, when they show different
/// volumes or parallel planes, or when `target` has no volume or canvas.
pub fn calculate_reference_lines(
    active: &dyn Viewport,
    target: &dyn Viewport,
    style: &ReferenceLineStyle,
) -> Vec<ReferenceLine> {
    if active.id() == target.id() {
        return Vec::new();
    }
    let Some(target_volume) = target.volume_id() else {
        return Vec::new();
    };
    if active.volume_id().as_deref() != Some(target_volume.as_str()) {
        return Vec::new();
    }
    let Some(canvas) = target.canvas_size().filter(|canvas| !canvas.is_empty()) else {
        return Vec::new();
    };
    let Some((fixed_axis, free_axis)) =
        intersection_axes(active.orientation(), target.orientation())
    else {
        return Vec::new();
    };

    let active_camera = active.camera();
    let target_camera = target.camera();

    // Visible extent of the target slice along the line direction.
    let corners = [
        DVec2::new(0.0, 0.0),
        DVec2::new(canvas.width, 0.0),
        DVec2::new(0.0, canvas.height),
        DVec2::new(canvas.width, canvas.height),
    ];
    let (min, max) = corners
        .iter()
        .map(|&corner| screen_to_world(corner, &target_camera, canvas, None)[free_axis])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(value), max.max(value))
        });

    let endpoint = |free_value: f64| {
        let mut world: DVec3 = target_camera.focal_point;
        world[fixed_axis] = active_camera.focal_point[fixed_axis];
        world[free_axis] = free_value;
        world_to_screen(world, &target_camera, canvas)
    };
    let start = endpoint(min);
    let end = endpoint(max);

    vec![ReferenceLine {
        x1: start.x,
        y1: start.y,
        x2: end.x,
        y2: end.y,
        color: style.color_for(active.orientation()).to_string(),
        stroke_width: style.stroke_width,
        opacity: style.opacity,
    }]
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::camera::{Camera, CanvasSize, ImageGeometry};
    use crate::offscreen::OffscreenViewport;

    fn geometry() -> ImageGeometry {
        ImageGeometry {
            dimensions: [101, 101, 101],
            spacing: DVec3::ONE,
            origin: DVec3::ZERO,
        }
    }

    fn bound(id: &str, orientation: Orientation) -> OffscreenViewport {
        let viewport = OffscreenViewport::new(id, orientation, CanvasSize::new(200.0, 200.0));
        let geometry = geometry();
        viewport.bind_volume("ct", geometry);
        viewport.set_camera(Camera::for_orientation(orientation, &geometry));
        viewport
    }

    #[test]
    fn axial_plane_crosses_coronal_horizontally() {
        let axial = bound("a", Orientation::Axial);
        let coronal = bound("c", Orientation::Coronal);

        let lines = calculate_reference_lines(&axial, &coronal, &ReferenceLineStyle::default());

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_relative_eq!(line.y1, line.y2, epsilon = 1e-9);
        assert_relative_eq!(line.y1, 100.0, epsilon = 1e-9);
        assert_relative_eq!((line.x2 - line.x1).abs(), 200.0, epsilon = 1e-6);
        assert_eq!(line.color, "cyan");
    }

    #[test]
    fn sagittal_plane_crosses_axial_vertically() {
        let sagittal = bound("s", Orientation::Sagittal);
        let axial = bound("a", Orientation::Axial);

        let lines = calculate_reference_lines(&sagittal, &axial, &ReferenceLineStyle::default());

        assert_eq!(lines.len(), 1);
        assert_relative_eq!(lines[0].x1, lines[0].x2, epsilon = 1e-9);
    }

    #[test]
    fn no_line_onto_itself_or_parallel_planes() {
        let axial = bound("a", Orientation::Axial);
        let other_axial = bound("b", Orientation::Axial);
        let style = ReferenceLineStyle::default();

        assert!(calculate_reference_lines(&axial, &axial, &style).is_empty());
        assert!(calculate_reference_lines(&axial, &other_axial, &style).is_empty());
    }

    #[test]
    fn no_line_when_target_has_no_volume() {
        let axial = bound("a", Orientation::Axial);
        let empty = OffscreenViewport::new("c", Orientation::Coronal, CanvasSize::new(10.0, 10.0));

        assert!(
            calculate_reference_lines(&axial, &empty, &ReferenceLineStyle::default()).is_empty()
        );
    }
}
