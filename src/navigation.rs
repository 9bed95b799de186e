//! Bringing a stored measurement into view.
//!
//! Nothing here fails loudly: every abnormal case resolves to a
//! [`NavigationOutcome::Skipped`] and a log record, leaving the camera as is.

use glam::DVec3;
use tracing::{debug, warn};

use crate::annotation::Annotation;
use crate::camera::VolumeId;
use crate::config::NavigationConfig;
use crate::viewport::Viewport;

/// Geometry of a measurement in world space, in extraction priority order:
/// explicit point list, start/end pair, a single handle, then an outline.
pub fn extract_points(annotation: &Annotation) -> Vec<DVec3> {
    let handles = &annotation.data.handles;
    let points: Vec<[f64; 3]> = match (&handles.points, handles.start, handles.end) {
        (Some(points), _, _) if !points.is_empty() => points.clone(),
        (_, Some(start), Some(end)) => vec![start, end],
        (_, Some(single), None) | (_, None, Some(single)) => vec![single],
        _ => annotation
            .data
            .contour
            .as_ref()
            .map(|contour| contour.polyline.clone())
            .unwrap_or_default(),
    };
    points.into_iter().map(DVec3::from_array).collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: DVec3,
    pub max: DVec3,
}

impl BoundingBox {
    pub fn from_points(points: &[DVec3]) -> Option<Self> {
        let (&first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: first,
                max: first,
            },
            |bounds, &point| Self {
                min: bounds.min.min(point),
                max: bounds.max.max(point),
            },
        ))
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) / 2.0
    }

    pub fn diagonal(&self) -> f64 {
        self.min.distance(self.max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The measurement carries no extractable points.
    NoPoints,
    /// All points are zero or non-finite; jumping would land on the origin.
    DegenerateGeometry,
    /// No viewport of the resolved group is available.
    NoViewport,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NavigationOutcome {
    Moved {
        focal_point: DVec3,
        parallel_scale: f64,
    },
    AlreadyInView,
    Skipped(SkipReason),
}

/// Moves `viewport`'s camera so `annotation` is centred and fully visible.
pub fn jump_to_annotation_using_camera(
    viewport: &dyn Viewport,
    annotation: &Annotation,
    config: &NavigationConfig,
) -> NavigationOutcome {
    let points = extract_points(annotation);
    let Some(bounds) = BoundingBox::from_points(&points) else {
        warn!(annotation = %annotation.annotation_uid, "Measurement has no points");
        return NavigationOutcome::Skipped(SkipReason::NoPoints);
    };

    let center = bounds.center();
    let all_zero = points.iter().all(|point| *point == DVec3::ZERO);
    if !center.is_finite() || (center == DVec3::ZERO && all_zero) {
        warn!(annotation = %annotation.annotation_uid, "Measurement geometry is degenerate");
        return NavigationOutcome::Skipped(SkipReason::DegenerateGeometry);
    }

    let camera = viewport.camera();
    if camera.focal_point.distance(center) < config.in_view_tolerance {
        debug!(annotation = %annotation.annotation_uid, "Measurement already in view");
        return NavigationOutcome::AlreadyInView;
    }

    let mut moved = camera.with_focal_point(center);
    let required_scale = bounds.diagonal() / 2.0 * config.zoom_padding;
    if required_scale > moved.parallel_scale {
        moved.parallel_scale = required_scale;
    }
    viewport.set_camera(moved);
    viewport.render();

    debug!(
        annotation = %annotation.annotation_uid,
        viewport = %viewport.id(),
        "Jumped to measurement"
    );
    NavigationOutcome::Moved {
        focal_point: moved.focal_point,
        parallel_scale: moved.parallel_scale,
    }
}

/// Last segment of a volume identifier (`scheme:name` -> `name`).
fn volume_token(volume_id: &str) -> &str {
    volume_id.rsplit(':').next().unwrap_or(volume_id)
}

/// Picks which triplet of a multi-volume layout a measurement belongs to.
///
/// In priority order: an explicit volume id, an explicit sequence index, a
/// volume token embedded in the referenced image id, and finally triplet 0.
/// The image id parse is a heuristic and may pick the wrong volume when
/// tokens overlap.
pub fn resolve_triplet(
    annotation: &Annotation,
    volume_ids: &[VolumeId],
    total_viewports: usize,
) -> usize {
    if volume_ids.len() <= 1 {
        return 0;
    }
    let metadata = &annotation.metadata;

    if let Some(index) = metadata
        .volume_id
        .as_deref()
        .and_then(|volume_id| volume_ids.iter().position(|id| id == volume_id))
    {
        return index;
    }

    if let Some(sequence_index) = metadata.sequence_index {
        return if sequence_index < total_viewports / 2 { 0 } else { 1 };
    }

    if let Some(image_id) = metadata.referenced_image_id.as_deref() {
        if let Some(index) = volume_ids.iter().position(|id| image_id.contains(id.as_str())) {
            return index;
        }
        let by_token = volume_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (index, volume_token(id)))
            .filter(|(_, token)| !token.is_empty() && image_id.contains(token))
            .max_by_key(|(_, token)| token.len());
        if let Some((index, _)) = by_token {
            return index;
        }
    }

    warn!(
        annotation = %annotation.annotation_uid,
        "Could not determine the measurement's volume, using the first sequence"
    );
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationData, AnnotationMetadata, Contour, Handles};
    use crate::camera::{Camera, CanvasSize};
    use crate::enums::Orientation;
    use crate::offscreen::OffscreenViewport;

    fn annotation(handles: Handles, contour: Option<Contour>) -> Annotation {
        Annotation {
            annotation_uid: "m".to_string(),
            metadata: AnnotationMetadata::default(),
            data: AnnotationData { handles, contour },
        }
    }

    fn with_points(points: &[[f64; 3]]) -> Annotation {
        annotation(
            Handles {
                points: Some(points.to_vec()),
                ..Default::default()
            },
            None,
        )
    }

    fn viewport_at_origin() -> OffscreenViewport {
        let viewport = OffscreenViewport::new("vp", Orientation::Axial, CanvasSize::new(100.0, 100.0));
        viewport.set_camera(Camera {
            focal_point: DVec3::ZERO,
            position: DVec3::new(0.0, 0.0, 100.0),
            view_plane_normal: DVec3::Z,
            view_up: DVec3::Y,
            parallel_scale: 50.0,
        });
        viewport.reset_counters();
        viewport
    }

    #[test]
    fn point_extraction_priority() {
        let both = annotation(
            Handles {
                points: Some(vec![[1.0, 1.0, 1.0]]),
                start: Some([2.0, 2.0, 2.0]),
                end: Some([3.0, 3.0, 3.0]),
            },
            None,
        );
        assert_eq!(extract_points(&both), vec![DVec3::ONE]);

        let pair = annotation(
            Handles {
                points: Some(Vec::new()),
                start: Some([2.0, 2.0, 2.0]),
                end: Some([3.0, 3.0, 3.0]),
            },
            None,
        );
        assert_eq!(extract_points(&pair).len(), 2);

        let single = annotation(
            Handles {
                end: Some([3.0, 3.0, 3.0]),
                ..Default::default()
            },
            None,
        );
        assert_eq!(extract_points(&single), vec![DVec3::splat(3.0)]);

        let outline = annotation(
            Handles::default(),
            Some(Contour {
                polyline: vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0]],
            }),
        );
        assert_eq!(extract_points(&outline).len(), 3);
    }

    #[test]
    fn bounding_box_center_and_diagonal() {
        let bounds = BoundingBox::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(3.0, 4.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
        ])
        .unwrap();
        assert_eq!(bounds.center(), DVec3::new(1.5, 2.0, 0.0));
        assert_eq!(bounds.diagonal(), 5.0);
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn skips_when_already_in_view() {
        let viewport = viewport_at_origin();
        let before = viewport.camera();

        let outcome = jump_to_annotation_using_camera(
            &viewport,
            &with_points(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]),
            &NavigationConfig::default(),
        );

        assert_eq!(outcome, NavigationOutcome::AlreadyInView);
        assert_eq!(viewport.camera(), before);
        assert_eq!(viewport.camera_writes(), 0);
    }

    #[test]
    fn translates_camera_keeping_offset() {
        let viewport = viewport_at_origin();

        let outcome = jump_to_annotation_using_camera(
            &viewport,
            &with_points(&[[45.0, 0.0, 0.0], [55.0, 0.0, 0.0]]),
            &NavigationConfig::default(),
        );

        let camera = viewport.camera();
        assert_eq!(camera.focal_point, DVec3::new(50.0, 0.0, 0.0));
        assert_eq!(camera.position, DVec3::new(50.0, 0.0, 100.0));
        assert_eq!(camera.parallel_scale, 50.0);
        assert!(matches!(outcome, NavigationOutcome::Moved { .. }));
        assert_eq!(viewport.render_count(), 1);
    }

    #[test]
    fn zooms_out_for_large_measurements() {
        let viewport = viewport_at_origin();

        jump_to_annotation_using_camera(
            &viewport,
            &with_points(&[[100.0, 0.0, 0.0], [300.0, 0.0, 0.0]]),
            &NavigationConfig::default(),
        );

        let camera = viewport.camera();
        assert_eq!(camera.focal_point, DVec3::new(200.0, 0.0, 0.0));
        assert!((camera.parallel_scale - 110.0).abs() < 1e-9);
    }

    #[test]
    fn aborts_without_points_or_with_zero_geometry() {
        let viewport = viewport_at_origin();
        let config = NavigationConfig::default();

        let empty = annotation(Handles::default(), None);
        assert_eq!(
            jump_to_annotation_using_camera(&viewport, &empty, &config),
            NavigationOutcome::Skipped(SkipReason::NoPoints)
        );
        assert_eq!(
            jump_to_annotation_using_camera(&viewport, &with_points(&[[0.0; 3], [0.0; 3]]), &config),
            NavigationOutcome::Skipped(SkipReason::DegenerateGeometry)
        );
        assert_eq!(viewport.camera_writes(), 0);
    }

    fn volumes() -> Vec<VolumeId> {
        vec![
            "cornerstoneStreamingImageVolume:t1".to_string(),
            "cornerstoneStreamingImageVolume:t2flair".to_string(),
        ]
    }

    fn with_metadata(metadata: AnnotationMetadata) -> Annotation {
        Annotation {
            annotation_uid: "m".to_string(),
            metadata,
            data: AnnotationData::default(),
        }
    }

    #[test]
    fn explicit_volume_id_wins() {
        let annotation = with_metadata(AnnotationMetadata {
            volume_id: Some("cornerstoneStreamingImageVolume:t2flair".to_string()),
            sequence_index: Some(0),
            ..Default::default()
        });
        assert_eq!(resolve_triplet(&annotation, &volumes(), 6), 1);
    }

    #[test]
    fn sequence_index_splits_at_half_the_viewports() {
        let low = with_metadata(AnnotationMetadata {
            sequence_index: Some(2),
            ..Default::default()
        });
        let high = with_metadata(AnnotationMetadata {
            sequence_index: Some(3),
            ..Default::default()
        });
        assert_eq!(resolve_triplet(&low, &volumes(), 6), 0);
        assert_eq!(resolve_triplet(&high, &volumes(), 6), 1);
    }

    #[test]
    fn image_id_token_is_parsed() {
        let annotation = with_metadata(AnnotationMetadata {
            referenced_image_id: Some("wadouri:/studies/t2flair/12.dcm".to_string()),
            ..Default::default()
        });
        assert_eq!(resolve_triplet(&annotation, &volumes(), 6), 1);
    }

    #[test]
    fn falls_back_to_first_triplet() {
        let annotation = with_metadata(AnnotationMetadata {
            referenced_image_id: Some("wadouri:/studies/other/1.dcm".to_string()),
            ..Default::default()
        });
        assert_eq!(resolve_triplet(&annotation, &volumes(), 6), 0);
        assert_eq!(resolve_triplet(&annotation, &volumes()[..1], 3), 0);
    }
}
