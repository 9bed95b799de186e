use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::DVec3;
use ndarray::Array3;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dicom_mpr::{
    annotation::{Annotation, AnnotationData, AnnotationMetadata, Handles},
    camera::CanvasSize,
    config::MprConfig,
    debounce::{ResizeDebouncer, debounce},
    enums::{SlabMode, SortBy},
    manager::DynamicViewportManager,
    offscreen::{OffscreenEngine, OffscreenSurface},
    overlay::SvgLayerCache,
    thumbnail::ThumbnailRenderer,
    volume::{Volume, VolumeCache},
    volume_loader::VolumeLoader,
};

#[derive(Parser)]
#[command(name = "dicom-mpr", about = "Headless MPR layout walkthrough")]
#[command(version)]
struct Cli {
    /// Directory of .dcm files; a synthetic phantom is used when omitted
    #[arg(short, long)]
    dicom: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a series thumbnail to this path
    #[arg(short, long)]
    thumbnail: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

const VOLUME_ID: &str = "volume:primary";

fn phantom() -> Volume {
    let data = Array3::from_shape_fn((64, 128, 128), |(z, y, x)| {
        let d = DVec3::new(x as f64 - 64.0, y as f64 - 64.0, (z as f64 - 32.0) * 2.0);
        if d.length() < 48.0 { 1000 } else { 0 }
    });
    Volume::new(data, DVec3::new(1.0, 1.0, 2.0), DVec3::new(-64.0, -64.0, 0.0))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => MprConfig::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => MprConfig::default(),
    };

    let volume = match &cli.dicom {
        Some(directory) => VolumeLoader::load_from_directory(directory, SortBy::ImagePositionPatient)
            .with_context(|| format!("loading series from {}", directory.display()))?,
        None => phantom(),
    };
    let mut volumes = VolumeCache::new();
    let volume = volumes.insert(VOLUME_ID, volume);

    if let Some(path) = &cli.thumbnail {
        let thumbnail = ThumbnailRenderer::default()
            .render(&volume)
            .context("volume has no axial slices")?;
        thumbnail
            .save(path)
            .with_context(|| format!("writing thumbnail {}", path.display()))?;
        info!(path = %path.display(), "Thumbnail written");
    }

    let mut engine = OffscreenEngine::new();
    engine.register_cache(&volumes);

    let mut manager = DynamicViewportManager::new(config);
    manager.init(engine, OffscreenSurface::new(CanvasSize::new(512.0, 512.0)));

    let mpr = manager.apply_mpr_layout(VOLUME_ID, &[]).await?;
    manager.scroll(&mpr[0], 8);

    let mut overlay = SvgLayerCache::new(format!("{}-overlay", mpr[1]));
    for line in manager.reference_lines(&mpr[1]) {
        info!(
            x1 = line.x1,
            y1 = line.y1,
            x2 = line.x2,
            y2 = line.y2,
            color = %line.color,
            "Reference line in sagittal view"
        );
    }
    if let Some(svg) = manager.render_reference_overlay(&mpr[1], &mut overlay) {
        info!(bytes = svg.len(), lines = overlay.len(), "Overlay redrawn");
    }

    let grid = manager.apply_grid_layout(2, 2, VOLUME_ID, &mpr).await?;
    manager.set_slab(VOLUME_ID, 10.0, SlabMode::Max);

    let measurement = Annotation {
        annotation_uid: "demo-length".to_string(),
        metadata: AnnotationMetadata {
            tool_name: "Length".to_string(),
            volume_id: Some(VOLUME_ID.to_string()),
            ..Default::default()
        },
        data: AnnotationData {
            handles: Handles {
                start: Some([-20.0, 10.0, 40.0]),
                end: Some([20.0, 30.0, 40.0]),
                ..Default::default()
            },
            contour: None,
        },
    };
    let outcome = manager.jump_to_annotation(&measurement);
    info!(?outcome, viewport = %grid[0], "Navigated to measurement");

    let (resizes, receiver) = ResizeDebouncer::channel();
    for _ in 0..3 {
        resizes.notify();
    }
    drop(resizes);
    let window = manager.config().layout.resize_debounce();
    debounce(receiver, window, || manager.resize()).await;

    if let Some(engine) = manager.destroy() {
        info!(resizes = engine.resize_calls(), "Viewport manager released");
    }
    Ok(())
}
