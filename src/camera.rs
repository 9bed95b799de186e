use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::enums::{Orientation, SlabMode};

/// Viewport identifiers are opaque strings owned by the layout manager.
pub type ViewportId = String;

/// Volume identifiers are opaque strings owned by the rendering engine.
pub type VolumeId = String;

/// Orthographic camera of a volume viewport.
///
/// `view_plane_normal` points from the focal point towards `position`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub focal_point: DVec3,
    pub position: DVec3,
    pub view_plane_normal: DVec3,
    pub view_up: DVec3,
    /// Half the height of the visible world region.
    pub parallel_scale: f64,
}

impl Camera {
    /// Distance between the camera position and the focal plane used for
    /// freshly created cameras.
    pub const DEFAULT_DISTANCE: f64 = 1000.0;

    /// Default camera for `orientation` centred on the volume described by `geometry`.
    pub fn for_orientation(orientation: Orientation, geometry: &ImageGeometry) -> Self {
        let (normal, up) = match orientation {
            Orientation::Axial => (DVec3::NEG_Z, DVec3::NEG_Y),
            Orientation::Sagittal => (DVec3::X, DVec3::Z),
            Orientation::Coronal => (DVec3::NEG_Y, DVec3::Z),
        };
        let extent = geometry.extent();
        let in_plane = match orientation {
            Orientation::Axial => extent.x.max(extent.y),
            Orientation::Sagittal => extent.y.max(extent.z),
            Orientation::Coronal => extent.x.max(extent.z),
        };
        let focal_point = geometry.center();
        Self {
            focal_point,
            position: focal_point + normal * Self::DEFAULT_DISTANCE,
            view_plane_normal: normal,
            view_up: up,
            parallel_scale: (in_plane / 2.0).max(1.0),
        }
    }

    /// Vector from the focal point to the camera position.
    pub fn offset(&self) -> DVec3 {
        self.position - self.focal_point
    }

    /// Same camera moved so that its focal point is `focal_point`; the
    /// position keeps its offset from the focal point.
    pub fn with_focal_point(&self, focal_point: DVec3) -> Self {
        Self {
            focal_point,
            position: focal_point + self.offset(),
            ..*self
        }
    }
}

/// Window/level as an intensity interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiRange {
    pub lower: f64,
    pub upper: f64,
}

impl VoiRange {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportProperties {
    pub voi_range: Option<VoiRange>,
    pub slab_thickness: f64,
    pub slab_mode: SlabMode,
}

/// Partial property update; `None` fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PropertiesUpdate {
    pub voi_range: Option<VoiRange>,
    pub slab_thickness: Option<f64>,
    pub slab_mode: Option<SlabMode>,
    pub orientation: Option<Orientation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Placement of a voxel grid in patient space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageGeometry {
    /// Number of voxels along x, y and z.
    pub dimensions: [usize; 3],
    pub spacing: DVec3,
    pub origin: DVec3,
}

impl ImageGeometry {
    /// World-space size of the grid from the first to the last voxel centre.
    pub fn extent(&self) -> DVec3 {
        let last = DVec3::new(
            self.dimensions[0].saturating_sub(1) as f64,
            self.dimensions[1].saturating_sub(1) as f64,
            self.dimensions[2].saturating_sub(1) as f64,
        );
        last * self.spacing
    }

    pub fn center(&self) -> DVec3 {
        self.origin + self.extent() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> ImageGeometry {
        ImageGeometry {
            dimensions: [101, 201, 51],
            spacing: DVec3::new(1.0, 0.5, 2.0),
            origin: DVec3::new(-50.0, -50.0, 0.0),
        }
    }

    #[test]
    fn default_camera_looks_at_volume_center() {
        let camera = Camera::for_orientation(Orientation::Axial, &geometry());
        assert_eq!(camera.focal_point, DVec3::new(0.0, 0.0, 50.0));
        assert_eq!(camera.offset(), DVec3::NEG_Z * Camera::DEFAULT_DISTANCE);
        assert_eq!(camera.parallel_scale, 50.0);
    }

    #[test]
    fn moving_focal_point_keeps_offset() {
        let camera = Camera::for_orientation(Orientation::Sagittal, &geometry());
        let moved = camera.with_focal_point(DVec3::new(10.0, 20.0, 30.0));
        assert_eq!(moved.offset(), camera.offset());
        assert_eq!(moved.view_up, camera.view_up);
    }
}
