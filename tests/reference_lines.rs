use glam::DVec3;

use dicom_mpr::camera::{CanvasSize, ImageGeometry};
use dicom_mpr::enums::Orientation;
use dicom_mpr::offscreen::OffscreenViewport;
use dicom_mpr::reference_lines::{ReferenceLineStyle, calculate_reference_lines};
use dicom_mpr::viewport::Viewport;

fn bound(id: &str, orientation: Orientation) -> OffscreenViewport {
    let viewport = OffscreenViewport::new(id, orientation, CanvasSize::new(300.0, 200.0));
    viewport.bind_volume(
        "ct",
        ImageGeometry {
            dimensions: [200, 200, 100],
            spacing: DVec3::new(0.8, 0.8, 2.5),
            origin: DVec3::new(-80.0, -80.0, -125.0),
        },
    );
    viewport
}

#[test]
fn reference_line_follows_active_slice() {
    let axial = bound("axial", Orientation::Axial);
    let coronal = bound("coronal", Orientation::Coronal);
    let style = ReferenceLineStyle::default();

    let mut previous_y = f64::INFINITY;
    for step in -4..=4 {
        let z = f64::from(step) * 20.0;
        let mut focal_point = axial.camera().focal_point;
        focal_point.z = z;
        axial.set_camera(axial.camera().with_focal_point(focal_point));

        let lines = calculate_reference_lines(&axial, &coronal, &style);

        assert_eq!(lines.len(), 1);
        let y = lines[0].y1;
        assert!((lines[0].y2 - y).abs() < 1e-9);
        // Coronal screen space has superior at the top.
        assert!(y < previous_y, "line at z={z} is not above the previous one");
        previous_y = y;
    }
}

#[test]
fn sagittal_and_axial_lines_in_coronal_are_perpendicular() {
    let axial = bound("axial", Orientation::Axial);
    let sagittal = bound("sagittal", Orientation::Sagittal);
    let coronal = bound("coronal", Orientation::Coronal);
    let style = ReferenceLineStyle::default();

    let horizontal = &calculate_reference_lines(&axial, &coronal, &style)[0];
    let vertical = &calculate_reference_lines(&sagittal, &coronal, &style)[0];

    assert!((horizontal.y1 - horizontal.y2).abs() < 1e-9);
    assert!((vertical.x1 - vertical.x2).abs() < 1e-9);
    assert_ne!(horizontal.color, vertical.color);
}

#[test]
fn no_line_across_volumes() {
    let axial = bound("axial", Orientation::Axial);
    let coronal = OffscreenViewport::new("other", Orientation::Coronal, CanvasSize::new(64.0, 64.0));
    coronal.bind_volume("mr", axial.image_geometry().unwrap());

    assert!(calculate_reference_lines(&axial, &coronal, &ReferenceLineStyle::default()).is_empty());
}
