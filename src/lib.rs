//! # DICOM-MPR library
//!
//! This crate keeps a set of multiplanar reconstruction (MPR) viewports
//! consistent while the user navigates and switches layouts. Rendering,
//! pixel decoding and tool interaction belong to an external engine which
//! is reached through the [`viewport::RenderingEngine`] and
//! [`viewport::LayoutSurface`] traits.
//!
//! The crate provides:
//!  - Coordinate transforms between image-index, world and canvas space
//!  - Reference lines showing each slice plane inside the other views
//!  - Focal point and slab synchronization between viewports of a volume
//!  - A layout manager that rebuilds grids (N x M, MPR, dual-sequence MPR)
//!    while carrying camera and window/level state across the change
//!  - Navigation to stored measurements, including volume disambiguation in
//!    dual-sequence layouts
//!
//! Volumes can be loaded from a directory of DICOM files with
//! [`volume_loader::VolumeLoader`]. An in-memory engine in [`offscreen`] lets
//! the whole pipeline run headless.
//!
//! # Examples
//!
//! ## Switching from a three-pane MPR to a 2x2 grid
//!
//! ```no_run
//! # use dicom_mpr::config::MprConfig;
//! # use dicom_mpr::manager::DynamicViewportManager;
//! # use dicom_mpr::offscreen::{OffscreenEngine, OffscreenSurface};
//! # use dicom_mpr::camera::CanvasSize;
//! # async fn run(engine: OffscreenEngine) -> Result<(), dicom_mpr::error::LayoutError> {
//! let mut manager = DynamicViewportManager::new(MprConfig::default());
//! manager.init(engine, OffscreenSurface::new(CanvasSize::new(512.0, 512.0)));
//!
//! let mpr = manager.apply_mpr_layout("ct", &[]).await?;
//! manager.scroll(&mpr[0], 10);
//! let grid = manager.apply_grid_layout(2, 2, "ct", &mpr).await?;
//! let lines = manager.reference_lines(&grid[0]);
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod camera;
pub mod config;
pub mod debounce;
pub mod enums;
pub mod error;
pub mod events;
pub mod layout;
pub mod manager;
pub mod navigation;
pub mod offscreen;
pub mod overlay;
pub mod reference_lines;
pub mod sync;
pub mod thumbnail;
pub mod transform;
pub mod viewport;
pub mod volume;
pub mod volume_loader;
