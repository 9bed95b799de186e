//! Series thumbnails rendered on the CPU from a loaded volume.

use image::{GrayImage, ImageBuffer};
use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::enums::Orientation;
use crate::volume::Volume;

/// Renders slice previews that preserve the slice's physical aspect ratio.
#[derive(Clone, Copy, Debug)]
pub struct ThumbnailRenderer {
    max_size: u32,
}

impl Default for ThumbnailRenderer {
    fn default() -> Self {
        Self { max_size: 128 }
    }
}

impl ThumbnailRenderer {
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size: max_size.max(1),
        }
    }

    /// Thumbnail of the middle axial slice.
    pub fn render(&self, volume: &Volume) -> Option<GrayImage> {
        let index = volume.slice_count(Orientation::Axial) / 2;
        self.render_slice(volume, Orientation::Axial, index)
    }

    pub fn render_slice(
        &self,
        volume: &Volume,
        orientation: Orientation,
        index: usize,
    ) -> Option<GrayImage> {
        let slice = volume
            .get_slice_from_axis(index, orientation)
            .filter(|slice| !slice.is_empty())?;
        let (width, height) = self.output_size(volume.slice_extent(orientation));
        let (low, high) = volume.intensity_range();
        let span = f32::from(high.saturating_sub(low)).max(1.0);
        let low = f32::from(low);

        let pixels: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                let slice = &slice;
                (0..width).map(move |x| {
                    let value = sample(slice, x, y, width, height);
                    (((value - low) / span) * 255.0).clamp(0.0, 255.0) as u8
                })
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixels)
    }

    /// Largest size within `max_size` with the aspect ratio of `extent`.
    fn output_size(&self, (world_width, world_height): (f64, f64)) -> (u32, u32) {
        let max = f64::from(self.max_size);
        if world_width <= 0.0 || world_height <= 0.0 {
            return (self.max_size, self.max_size);
        }
        let scale = max / world_width.max(world_height);
        let width = (world_width * scale).round().max(1.0) as u32;
        let height = (world_height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// Bilinear sample of `slice` at the centre of output pixel `(x, y)`.
fn sample(slice: &ArrayView2<'_, u16>, x: u32, y: u32, width: u32, height: u32) -> f32 {
    let (rows, cols) = slice.dim();
    let src_x = ((x as f32 + 0.5) / width as f32 * cols as f32 - 0.5).clamp(0.0, (cols - 1) as f32);
    let src_y = ((y as f32 + 0.5) / height as f32 * rows as f32 - 0.5).clamp(0.0, (rows - 1) as f32);

    let x0 = src_x.floor() as usize;
    let y0 = src_y.floor() as usize;
    let x1 = (x0 + 1).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);
    let dx = src_x - x0 as f32;
    let dy = src_y - y0 as f32;

    let value = |row: usize, col: usize| f32::from(slice[[row, col]]);
    let top = value(y0, x0).mul_add(1.0 - dx, value(y0, x1) * dx);
    let bottom = value(y1, x0).mul_add(1.0 - dx, value(y1, x1) * dx);
    top.mul_add(1.0 - dy, bottom * dy)
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use ndarray::Array3;

    use super::*;

    fn volume() -> Volume {
        let data = Array3::from_shape_fn((10, 20, 40), |(_, _, x)| (x * 100) as u16);
        Volume::new(data, DVec3::new(1.0, 1.0, 4.0), DVec3::ZERO)
    }

    #[test]
    fn keeps_physical_aspect_ratio() {
        let renderer = ThumbnailRenderer::new(64);
        let axial = renderer.render(&volume()).unwrap();
        assert_eq!(axial.dimensions(), (64, 32));

        let sagittal = renderer
            .render_slice(&volume(), Orientation::Sagittal, 0)
            .unwrap();
        assert_eq!(sagittal.dimensions(), (32, 64));
    }

    #[test]
    fn normalizes_to_full_range() {
        let thumbnail = ThumbnailRenderer::new(40).render(&volume()).unwrap();
        assert_eq!(thumbnail.get_pixel(0, 0).0[0], 0);
        assert_eq!(thumbnail.get_pixel(39, 0).0[0], 255);
    }

    #[test]
    fn empty_slice_has_no_thumbnail() {
        let flat = Volume::new(Array3::zeros((3, 0, 4)), DVec3::ONE, DVec3::ZERO);
        assert!(ThumbnailRenderer::default().render(&flat).is_none());
    }

    #[test]
    fn out_of_range_slice_has_no_thumbnail() {
        assert!(
            ThumbnailRenderer::default()
                .render_slice(&volume(), Orientation::Coronal, 20)
                .is_none()
        );
    }
}
