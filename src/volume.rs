use std::collections::HashMap;
use std::rc::Rc;

use glam::DVec3;
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;

use crate::camera::{ImageGeometry, VolumeId};
use crate::enums::Orientation;

/// A scalar voxel grid placed in patient space.
///
/// Voxels are stored as `(depth, height, width)`, i.e. `(z, y, x)`.
#[derive(Debug)]
pub struct Volume {
    data: Array3<u16>,
    geometry: ImageGeometry,
}

impl Volume {
    /// `spacing` and `origin` are given in world `(x, y, z)` order.
    pub fn new(data: Array3<u16>, spacing: DVec3, origin: DVec3) -> Self {
        let (depth, height, width) = data.dim();
        Self {
            data,
            geometry: ImageGeometry {
                dimensions: [width, height, depth],
                spacing,
                origin,
            },
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Number of slices available along `orientation`'s normal.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.geometry.dimensions[orientation.normal_axis()]
    }

    /// The `index`-th canonical slice, rows first. Axial slices are `(y, x)`,
    /// coronal slices `(z, x)` and sagittal slices `(z, y)`.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, u16>> {
        if index >= self.slice_count(orientation) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    /// Physical `(width, height)` of a canonical slice in world units.
    pub fn slice_extent(&self, orientation: Orientation) -> (f64, f64) {
        let [nx, ny, nz] = self.geometry.dimensions.map(|n| n as f64);
        let spacing = self.geometry.spacing;
        match orientation {
            Orientation::Axial => (nx * spacing.x, ny * spacing.y),
            Orientation::Coronal => (nx * spacing.x, nz * spacing.z),
            Orientation::Sagittal => (ny * spacing.y, nz * spacing.z),
        }
    }

    /// Smallest and largest stored intensity.
    pub fn intensity_range(&self) -> (u16, u16) {
        self.data
            .view()
            .into_par_iter()
            .map(|&value| (value, value))
            .reduce(
                || (u16::MAX, u16::MIN),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            )
    }
}

/// Volumes loaded by the application, keyed by the identifiers viewports are
/// bound with.
#[derive(Debug, Default)]
pub struct VolumeCache {
    volumes: HashMap<VolumeId, Rc<Volume>>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, volume_id: impl Into<VolumeId>, volume: Volume) -> Rc<Volume> {
        let volume = Rc::new(volume);
        self.volumes.insert(volume_id.into(), Rc::clone(&volume));
        volume
    }

    pub fn get(&self, volume_id: &str) -> Option<Rc<Volume>> {
        self.volumes.get(volume_id).cloned()
    }

    pub fn geometry(&self, volume_id: &str) -> Option<ImageGeometry> {
        self.volumes.get(volume_id).map(|volume| *volume.geometry())
    }

    pub fn remove(&mut self, volume_id: &str) -> Option<Rc<Volume>> {
        self.volumes.remove(volume_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VolumeId, &Rc<Volume>)> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Volume {
        let data = Array3::from_shape_fn((4, 3, 2), |(z, y, x)| (z * 100 + y * 10 + x) as u16);
        Volume::new(data, DVec3::new(0.5, 0.5, 2.0), DVec3::new(-1.0, -1.0, 10.0))
    }

    #[test]
    fn geometry_is_in_world_axis_order() {
        let volume = ramp();
        assert_eq!(volume.geometry().dimensions, [2, 3, 4]);
        assert_eq!(volume.slice_count(Orientation::Axial), 4);
        assert_eq!(volume.slice_count(Orientation::Sagittal), 2);
    }

    #[test]
    fn slices_along_each_axis() {
        let volume = ramp();
        let axial = volume.get_slice_from_axis(2, Orientation::Axial).unwrap();
        assert_eq!(axial.dim(), (3, 2));
        assert_eq!(axial[[1, 1]], 211);

        let coronal = volume.get_slice_from_axis(1, Orientation::Coronal).unwrap();
        assert_eq!(coronal.dim(), (4, 2));
        assert_eq!(coronal[[3, 0]], 310);

        assert!(volume.get_slice_from_axis(2, Orientation::Sagittal).is_none());
    }

    #[test]
    fn intensity_range_spans_data() {
        assert_eq!(ramp().intensity_range(), (0, 321));
    }

    #[test]
    fn cache_exposes_geometry() {
        let mut cache = VolumeCache::new();
        cache.insert("ct", ramp());
        assert_eq!(cache.geometry("ct").unwrap().origin, DVec3::new(-1.0, -1.0, 10.0));
        assert!(cache.geometry("mr").is_none());
    }
}
