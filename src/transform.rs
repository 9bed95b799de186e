//! Conversions between image-index, world (patient) and screen (canvas pixel)
//! space.
//!
//! Every function here is a thin numeric utility over one viewport's metadata.
//! Callers are responsible for making sure that metadata exists.

use glam::{DMat4, DQuat, DVec2, DVec3};

use crate::camera::{Camera, CanvasSize, ImageGeometry};

/// `origin + index * spacing`, elementwise.
pub fn image_to_world(image_point: DVec3, geometry: &ImageGeometry) -> DVec3 {
    geometry.origin + image_point * geometry.spacing
}

pub fn world_to_image(world_point: DVec3, geometry: &ImageGeometry) -> DVec3 {
    (world_point - geometry.origin) / geometry.spacing
}

pub fn view_matrix(camera: &Camera) -> DMat4 {
    DMat4::look_at_rh(camera.position, camera.focal_point, camera.view_up)
}

/// Orthographic projection whose visible half-height is the camera's
/// parallel scale. The focal plane sits in the middle of the depth range.
pub fn projection_matrix(camera: &Camera, canvas: CanvasSize) -> DMat4 {
    let aspect = if canvas.height > 0.0 {
        canvas.width / canvas.height
    } else {
        1.0
    };
    let half_height = camera.parallel_scale;
    let half_width = camera.parallel_scale * aspect;
    let distance = camera.offset().length().max(1.0);
    DMat4::orthographic_rh(
        -half_width,
        half_width,
        -half_height,
        half_height,
        0.0,
        2.0 * distance,
    )
}

fn view_projection(camera: &Camera, canvas: CanvasSize) -> DMat4 {
    projection_matrix(camera, canvas) * view_matrix(camera)
}

pub fn world_to_screen(world_point: DVec3, camera: &Camera, canvas: CanvasSize) -> DVec2 {
    let clip = view_projection(camera, canvas).project_point3(world_point);
    DVec2::new(
        (clip.x + 1.0) * canvas.width / 2.0,
        (1.0 - clip.y) * canvas.height / 2.0,
    )
}

/// Unprojects a canvas pixel back into world space.
///
/// `depth` is a clip-space depth; when omitted the depth of the camera's
/// focal point is used, so the result lies on the current slice plane.
pub fn screen_to_world(
    screen_point: DVec2,
    camera: &Camera,
    canvas: CanvasSize,
    depth: Option<f64>,
) -> DVec3 {
    let view_projection = view_projection(camera, canvas);
    let depth = depth.unwrap_or_else(|| view_projection.project_point3(camera.focal_point).z);
    let clip = DVec3::new(
        2.0 * screen_point.x / canvas.width - 1.0,
        1.0 - 2.0 * screen_point.y / canvas.height,
        depth,
    );
    view_projection.inverse().project_point3(clip)
}

pub fn calculate_distance_3d(a: DVec3, b: DVec3) -> f64 {
    a.distance(b)
}

/// Rotates `point` around `axis` (through the origin) by `angle` radians.
/// A zero or non-finite axis leaves `point` unchanged.
pub fn rotate_point_around_axis(point: DVec3, axis: DVec3, angle: f64) -> DVec3 {
    let axis = axis.normalize_or_zero();
    if axis == DVec3::ZERO {
        return point;
    }
    DQuat::from_axis_angle(axis, angle) * point
}

/// Whether an image-index coordinate lies inside a grid of `dimensions`.
pub fn is_coordinate_valid(image_point: DVec3, dimensions: [usize; 3]) -> bool {
    image_point
        .to_array()
        .iter()
        .zip(dimensions)
        .all(|(&value, dim)| dim > 0 && value >= 0.0 && value <= (dim - 1) as f64)
}

/// Clamps each axis of an image-index coordinate to `[0, dimension - 1]`.
pub fn clamp_coordinate(image_point: DVec3, dimensions: [usize; 3]) -> DVec3 {
    let max = DVec3::new(
        dimensions[0].saturating_sub(1) as f64,
        dimensions[1].saturating_sub(1) as f64,
        dimensions[2].saturating_sub(1) as f64,
    );
    image_point.clamp(DVec3::ZERO, max)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use super::*;
    use crate::enums::Orientation;

    fn geometry() -> ImageGeometry {
        ImageGeometry {
            dimensions: [64, 64, 32],
            spacing: DVec3::new(0.7, 0.7, 2.5),
            origin: DVec3::new(-22.4, -30.0, 100.0),
        }
    }

    #[test]
    fn image_world_round_trip() {
        let geometry = geometry();
        for point in [
            DVec3::ZERO,
            DVec3::new(63.0, 63.0, 31.0),
            DVec3::new(12.5, 40.25, 7.0),
        ] {
            let back = world_to_image(image_to_world(point, &geometry), &geometry);
            assert!((back - point).length() < 1e-6, "{point} -> {back}");
        }
    }

    #[test]
    fn focal_point_projects_to_canvas_center() {
        let camera = Camera::for_orientation(Orientation::Coronal, &geometry());
        let canvas = CanvasSize::new(400.0, 300.0);
        let screen = world_to_screen(camera.focal_point, &camera, canvas);
        assert_relative_eq!(screen.x, 200.0, epsilon = 1e-9);
        assert_relative_eq!(screen.y, 150.0, epsilon = 1e-9);
    }

    #[test]
    fn view_up_points_to_top_of_canvas() {
        let camera = Camera::for_orientation(Orientation::Sagittal, &geometry());
        let canvas = CanvasSize::new(256.0, 256.0);
        let above = camera.focal_point + camera.view_up * camera.parallel_scale;
        let screen = world_to_screen(above, &camera, canvas);
        assert_relative_eq!(screen.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn screen_world_round_trip_on_focal_plane() {
        let camera = Camera::for_orientation(Orientation::Axial, &geometry());
        let canvas = CanvasSize::new(512.0, 384.0);
        let screen = DVec2::new(100.0, 290.0);
        let world = screen_to_world(screen, &camera, canvas, None);
        assert_relative_eq!(world.z, camera.focal_point.z, epsilon = 1e-6);
        let back = world_to_screen(world, &camera, canvas);
        assert_relative_eq!(back.x, screen.x, epsilon = 1e-6);
        assert_relative_eq!(back.y, screen.y, epsilon = 1e-6);
    }

    #[test]
    fn rotates_quarter_turn() {
        let rotated = rotate_point_around_axis(DVec3::X, DVec3::Z * 3.0, FRAC_PI_2);
        assert!((rotated - DVec3::Y).length() < 1e-12);
    }

    #[test]
    fn zero_axis_leaves_point_in_place() {
        let point = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(rotate_point_around_axis(point, DVec3::ZERO, 1.0), point);
    }

    #[test]
    fn validates_and_clamps_coordinates() {
        let dims = [10, 20, 5];
        assert!(is_coordinate_valid(DVec3::new(9.0, 0.0, 4.0), dims));
        assert!(!is_coordinate_valid(DVec3::new(9.5, 0.0, 4.0), dims));
        assert!(!is_coordinate_valid(DVec3::new(0.0, -0.1, 0.0), dims));
        assert_eq!(
            clamp_coordinate(DVec3::new(12.0, -3.0, 2.0), dims),
            DVec3::new(9.0, 0.0, 2.0)
        );
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(
            calculate_distance_3d(DVec3::ZERO, DVec3::new(3.0, 4.0, 12.0)),
            13.0
        );
    }
}
