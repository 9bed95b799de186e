use crate::{enums::SortBy, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use glam::DVec3;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// One decoded slice with the attributes needed to place it in the volume.
struct SliceRecord {
    order: Option<f32>,
    position: Option<DVec3>,
    image: Array2<u16>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// Slices are stacked in ascending `sort_by` order. The origin is the
    /// Image Position (Patient) of the first slice and the slice spacing is
    /// measured between the first two positions, falling back to Slice
    /// Thickness.
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent or
    /// pixel spacing is missing
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        let spacing = Self::get_spacing(dicom_objects.iter().map(|object| &**object))
            .ok_or(VolumeLoaderError::MissingSpacing)?;
        Self::assemble(slices, spacing, &sort_by)
    }

    /// Stacks decoded slices into a volume placed in patient space.
    fn assemble(
        mut slices: Vec<SliceRecord>,
        (row_spacing, column_spacing, thickness): (f64, f64, f64),
        sort_by: &SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Self::validate_dimensions(&slices)?;

        let slice_spacing = Self::slice_spacing(&slices).unwrap_or(thickness);
        let origin = slices[0].position.unwrap_or(DVec3::ZERO);
        let volume_array = Self::build_volume_array(&slices);

        info!(
            slices = slices.len(),
            rows = volume_array.dim().1,
            columns = volume_array.dim().2,
            "DICOM series stacked into volume"
        );
        Ok(Volume::new(
            volume_array,
            DVec3::new(column_spacing, row_spacing, slice_spacing),
            origin,
        ))
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        debug!(files = paths.len(), directory = %path.as_ref().display(), "Loading series");

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceRecord> {
        let position = Self::get_position(dicom_object);
        let order = match sort_by {
            SortBy::ImagePositionPatient => Some(position?.z as f32),
            SortBy::TablePosition => dicom_object
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float32()
                .ok(),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => Some(0.0),
        };
        let image = Self::decode_image(dicom_object)?;
        Some(SliceRecord {
            order,
            position,
            image,
        })
    }

    fn get_position(dicom_object: &InMemDicomObject) -> Option<DVec3> {
        let position = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        match position.as_slice() {
            [x, y, z, ..] => Some(DVec3::new(*x, *y, *z)),
            _ => None,
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn validate_dimensions(slices: &[SliceRecord]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[SliceRecord]) -> Array3<u16> {
        let (height, width) = slices[0].image.dim();
        let mut volume = Array3::<u16>::zeros((slices.len(), height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    fn slice_spacing(slices: &[SliceRecord]) -> Option<f64> {
        let first = slices.first()?.position?;
        let second = slices.get(1)?.position?;
        let distance = first.distance(second);
        (distance > f64::EPSILON).then_some(distance)
    }

    /// `(row spacing, column spacing, slice thickness)` from the first object
    /// carrying all three.
    fn get_spacing<'a>(
        dicom_objects: impl IntoIterator<Item = &'a InMemDicomObject>,
    ) -> Option<(f64, f64, f64)> {
        dicom_objects.into_iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()?;

            Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?, slice_thickness))
        })
    }
}
