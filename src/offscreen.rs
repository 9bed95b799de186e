//! In-process implementations of the engine and surface seams.
//!
//! `OffscreenEngine` keeps viewport state in memory without drawing anything.
//! It backs the demo binary and the tests, and records enough bookkeeping
//! (batch calls, renders, camera writes) to observe how callers drive it.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tracing::debug;

use crate::camera::{
    Camera, CanvasSize, ImageGeometry, PropertiesUpdate, ViewportId, ViewportProperties, VolumeId,
};
use crate::enums::Orientation;
use crate::error::{EngineError, SurfaceError};
use crate::events::{EventBus, Subscription};
use crate::viewport::{
    Attachment, AttachmentNotifier, CameraModifiedEvent, GridCell, LayoutSurface, RenderingEngine,
    Viewport, ViewportHandle, ViewportInput, VolumeInput,
};
use crate::volume::VolumeCache;

#[derive(Debug)]
pub struct OffscreenViewport {
    id: ViewportId,
    orientation: Cell<Orientation>,
    camera: Cell<Camera>,
    properties: Cell<ViewportProperties>,
    canvas: Cell<Option<CanvasSize>>,
    volume: RefCell<Option<(VolumeId, ImageGeometry)>>,
    render_count: Cell<usize>,
    camera_writes: Cell<usize>,
    camera_events: EventBus<CameraModifiedEvent>,
}

impl OffscreenViewport {
    pub fn new(id: impl Into<ViewportId>, orientation: Orientation, canvas: CanvasSize) -> Self {
        Self {
            id: id.into(),
            orientation: Cell::new(orientation),
            camera: Cell::new(Camera {
                focal_point: glam::DVec3::ZERO,
                position: glam::DVec3::Z * Camera::DEFAULT_DISTANCE,
                view_plane_normal: glam::DVec3::Z,
                view_up: glam::DVec3::Y,
                parallel_scale: 1.0,
            }),
            properties: Cell::new(ViewportProperties::default()),
            canvas: Cell::new(Some(canvas)),
            volume: RefCell::new(None),
            render_count: Cell::new(0),
            camera_writes: Cell::new(0),
            camera_events: EventBus::new(),
        }
    }

    /// Attaches volume metadata and resets the camera to the volume's default
    /// view for the current orientation.
    pub fn bind_volume(&self, volume_id: impl Into<VolumeId>, geometry: ImageGeometry) {
        *self.volume.borrow_mut() = Some((volume_id.into(), geometry));
        self.set_camera(Camera::for_orientation(self.orientation.get(), &geometry));
    }

    pub fn detach(&self) {
        self.canvas.set(None);
    }

    pub fn render_count(&self) -> usize {
        self.render_count.get()
    }

    /// Number of `set_camera` calls since creation.
    pub fn camera_writes(&self) -> usize {
        self.camera_writes.get()
    }

    pub fn reset_counters(&self) {
        self.render_count.set(0);
        self.camera_writes.set(0);
    }
}

impl Viewport for OffscreenViewport {
    fn id(&self) -> &str {
        &self.id
    }

    fn orientation(&self) -> Orientation {
        self.orientation.get()
    }

    fn camera(&self) -> Camera {
        self.camera.get()
    }

    fn set_camera(&self, camera: Camera) {
        let previous = self.camera.replace(camera);
        self.camera_writes.set(self.camera_writes.get() + 1);
        self.camera_events.emit(&CameraModifiedEvent {
            viewport_id: self.id.clone(),
            previous,
            camera,
        });
    }

    fn properties(&self) -> ViewportProperties {
        self.properties.get()
    }

    fn set_properties(&self, update: PropertiesUpdate) {
        let mut properties = self.properties.get();
        if let Some(voi_range) = update.voi_range {
            properties.voi_range = Some(voi_range);
        }
        if let Some(thickness) = update.slab_thickness {
            properties.slab_thickness = thickness.max(0.0);
        }
        if let Some(mode) = update.slab_mode {
            properties.slab_mode = mode;
        }
        self.properties.set(properties);

        if let Some(orientation) = update.orientation
            && orientation != self.orientation.get()
        {
            self.orientation.set(orientation);
            let geometry = self.volume.borrow().as_ref().map(|(_, geometry)| *geometry);
            if let Some(geometry) = geometry {
                self.set_camera(Camera::for_orientation(orientation, &geometry));
            }
        }
    }

    fn canvas_size(&self) -> Option<CanvasSize> {
        self.canvas.get()
    }

    fn volume_id(&self) -> Option<VolumeId> {
        self.volume.borrow().as_ref().map(|(id, _)| id.clone())
    }

    fn image_geometry(&self) -> Option<ImageGeometry> {
        self.volume.borrow().as_ref().map(|(_, geometry)| *geometry)
    }

    fn render(&self) {
        self.render_count.set(self.render_count.get() + 1);
    }

    fn on_camera_modified(&self, listener: Box<dyn Fn(&CameraModifiedEvent)>) -> Subscription {
        self.camera_events.subscribe(listener)
    }
}

/// A recorded `bind_volumes` call.
#[derive(Clone, Debug, PartialEq)]
pub struct BindCall {
    pub volume_ids: Vec<VolumeId>,
    pub viewport_ids: Vec<ViewportId>,
    pub immediate_render: bool,
}

#[derive(Debug, Default)]
pub struct OffscreenEngine {
    viewports: BTreeMap<ViewportId, Rc<OffscreenViewport>>,
    volumes: HashMap<VolumeId, ImageGeometry>,
    failing_disables: HashSet<ViewportId>,
    set_viewports_calls: usize,
    enable_calls: usize,
    resize_calls: usize,
    bind_calls: Vec<BindCall>,
}

impl OffscreenEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a volume available for binding.
    pub fn register_volume(&mut self, volume_id: impl Into<VolumeId>, geometry: ImageGeometry) {
        self.volumes.insert(volume_id.into(), geometry);
    }

    /// Makes every volume of `cache` available for binding.
    pub fn register_cache(&mut self, cache: &VolumeCache) {
        for (volume_id, volume) in cache.iter() {
            self.register_volume(volume_id.clone(), *volume.geometry());
        }
    }

    pub fn offscreen_viewport(&self, viewport_id: &str) -> Option<Rc<OffscreenViewport>> {
        self.viewports.get(viewport_id).cloned()
    }

    pub fn viewport_ids(&self) -> Vec<ViewportId> {
        self.viewports.keys().cloned().collect()
    }

    /// Makes the next `disable_viewport` call for `viewport_id` fail.
    pub fn fail_disable(&mut self, viewport_id: impl Into<ViewportId>) {
        self.failing_disables.insert(viewport_id.into());
    }

    pub fn set_viewports_calls(&self) -> usize {
        self.set_viewports_calls
    }

    pub fn enable_calls(&self) -> usize {
        self.enable_calls
    }

    pub fn resize_calls(&self) -> usize {
        self.resize_calls
    }

    pub fn bind_calls(&self) -> &[BindCall] {
        &self.bind_calls
    }

    fn insert_viewport(&mut self, input: &ViewportInput) -> Result<(), EngineError> {
        if self.viewports.contains_key(&input.viewport_id) {
            return Err(EngineError::DuplicateViewport(input.viewport_id.clone()));
        }
        let viewport =
            OffscreenViewport::new(input.viewport_id.clone(), input.orientation, input.canvas);
        self.viewports
            .insert(input.viewport_id.clone(), Rc::new(viewport));
        Ok(())
    }
}

impl RenderingEngine for OffscreenEngine {
    fn enable_viewport(&mut self, input: ViewportInput) -> Result<(), EngineError> {
        self.enable_calls += 1;
        self.insert_viewport(&input)
    }

    fn disable_viewport(&mut self, viewport_id: &str) -> Result<(), EngineError> {
        if self.failing_disables.remove(viewport_id) {
            return Err(EngineError::Backend(format!(
                "failed to release rendering context of {viewport_id}"
            )));
        }
        let viewport = self
            .viewports
            .remove(viewport_id)
            .ok_or_else(|| EngineError::UnknownViewport(viewport_id.to_string()))?;
        viewport.detach();
        Ok(())
    }

    fn set_viewports(&mut self, inputs: &[ViewportInput]) -> Result<(), EngineError> {
        self.set_viewports_calls += 1;
        for input in inputs {
            self.insert_viewport(input)?;
        }
        Ok(())
    }

    fn viewport(&self, viewport_id: &str) -> Option<ViewportHandle> {
        self.viewports
            .get(viewport_id)
            .map(|viewport| Rc::clone(viewport) as ViewportHandle)
    }

    fn render_viewports(&self, viewport_ids: &[ViewportId]) {
        for viewport in viewport_ids.iter().filter_map(|id| self.viewports.get(id)) {
            viewport.render();
        }
    }

    fn resize(&mut self, reset_pan: bool, reset_zoom: bool) {
        self.resize_calls += 1;
        for viewport in self.viewports.values() {
            let Some(geometry) = viewport.image_geometry() else {
                continue;
            };
            let default = Camera::for_orientation(viewport.orientation(), &geometry);
            let mut camera = viewport.camera();
            if reset_zoom {
                camera.parallel_scale = default.parallel_scale;
            }
            if reset_pan {
                // Recentre in-plane while keeping the current slice depth.
                let normal = camera.view_plane_normal.normalize();
                let depth = (camera.focal_point - default.focal_point).dot(normal);
                camera = camera.with_focal_point(default.focal_point + normal * depth);
            }
            if camera != viewport.camera() {
                viewport.set_camera(camera);
            }
        }
    }

    async fn bind_volumes(
        &mut self,
        volumes: &[VolumeInput],
        viewport_ids: &[ViewportId],
        immediate_render: bool,
    ) -> Result<(), EngineError> {
        tokio::task::yield_now().await;

        self.bind_calls.push(BindCall {
            volume_ids: volumes.iter().map(|v| v.volume_id.clone()).collect(),
            viewport_ids: viewport_ids.to_vec(),
            immediate_render,
        });

        let Some(primary) = volumes.first() else {
            return Ok(());
        };
        let geometry = *self
            .volumes
            .get(&primary.volume_id)
            .ok_or_else(|| EngineError::UnknownVolume(primary.volume_id.clone()))?;

        for viewport_id in viewport_ids {
            let viewport = self
                .viewports
                .get(viewport_id)
                .ok_or_else(|| EngineError::UnknownViewport(viewport_id.clone()))?;
            viewport.bind_volume(primary.volume_id.clone(), geometry);
            if immediate_render {
                viewport.render();
            }
        }
        debug!(
            volume = %primary.volume_id,
            viewports = viewport_ids.len(),
            "Volume bound"
        );
        Ok(())
    }
}

/// Element tree stand-in with fixed-size cells.
#[derive(Debug)]
pub struct OffscreenSurface {
    has_container: bool,
    cell_size: CanvasSize,
    grid: (usize, usize),
    cells: Vec<GridCell>,
    defer_attachment: bool,
    pending: Vec<AttachmentNotifier>,
    clear_count: usize,
}

impl OffscreenSurface {
    pub fn new(cell_size: CanvasSize) -> Self {
        Self {
            has_container: true,
            cell_size,
            grid: (0, 0),
            cells: Vec::new(),
            defer_attachment: false,
            pending: Vec::new(),
            clear_count: 0,
        }
    }

    pub fn without_container(cell_size: CanvasSize) -> Self {
        Self {
            has_container: false,
            ..Self::new(cell_size)
        }
    }

    /// Holds attachment signals until [`OffscreenSurface::confirm_attachment`].
    pub fn with_deferred_attachment(mut self) -> Self {
        self.defer_attachment = true;
        self
    }

    pub fn confirm_attachment(&mut self) {
        for notifier in self.pending.drain(..) {
            notifier.notify();
        }
    }

    pub fn grid(&self) -> (usize, usize) {
        self.grid
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn clear_count(&self) -> usize {
        self.clear_count
    }
}

impl LayoutSurface for OffscreenSurface {
    fn has_container(&self) -> bool {
        self.has_container
    }

    fn clear(&mut self) {
        self.clear_count += 1;
        self.cells.clear();
        self.grid = (0, 0);
    }

    fn build_grid(
        &mut self,
        rows: usize,
        cols: usize,
        cells: &[GridCell],
    ) -> Result<Attachment, SurfaceError> {
        if !self.has_container {
            return Err(SurfaceError::MissingContainer);
        }
        self.grid = (rows, cols);
        self.cells = cells.to_vec();
        if self.defer_attachment {
            let (attachment, notifier) = Attachment::pending();
            self.pending.push(notifier);
            Ok(attachment)
        } else {
            Ok(Attachment::ready())
        }
    }

    fn element_size(&self, element_id: &str) -> Option<CanvasSize> {
        self.cells
            .iter()
            .any(|cell| cell.viewport_id == element_id)
            .then_some(self.cell_size)
    }
}
