//! Seams to the external rendering engine and the element tree that hosts it.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;

use crate::camera::{
    Camera, CanvasSize, ImageGeometry, PropertiesUpdate, ViewportId, ViewportProperties, VolumeId,
};
use crate::enums::Orientation;
use crate::error::{EngineError, SurfaceError};
use crate::events::Subscription;

/// Camera change notification emitted by a viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraModifiedEvent {
    pub viewport_id: ViewportId,
    pub previous: Camera,
    pub camera: Camera,
}

/// A rendering surface bound to one element, at most one volume, and one
/// slice orientation.
///
/// Viewports are shared through [`ViewportHandle`]s, so every mutator takes
/// `&self`. `set_camera` notifies camera listeners synchronously.
pub trait Viewport {
    fn id(&self) -> &str;
    fn orientation(&self) -> Orientation;
    fn camera(&self) -> Camera;
    fn set_camera(&self, camera: Camera);
    fn properties(&self) -> ViewportProperties;
    fn set_properties(&self, update: PropertiesUpdate);
    /// Size of the bound canvas, `None` once the element is detached.
    fn canvas_size(&self) -> Option<CanvasSize>;
    fn volume_id(&self) -> Option<VolumeId>;
    fn image_geometry(&self) -> Option<ImageGeometry>;
    fn render(&self);
    fn on_camera_modified(&self, listener: Box<dyn Fn(&CameraModifiedEvent)>) -> Subscription;
}

pub type ViewportHandle = Rc<dyn Viewport>;

/// Registration request for one viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportInput {
    pub viewport_id: ViewportId,
    /// Identifier of the element hosting the viewport canvas.
    pub element_id: String,
    pub orientation: Orientation,
    pub canvas: CanvasSize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeInput {
    pub volume_id: VolumeId,
}

pub trait RenderingEngine {
    fn enable_viewport(&mut self, input: ViewportInput) -> Result<(), EngineError>;
    fn disable_viewport(&mut self, viewport_id: &str) -> Result<(), EngineError>;
    /// Registers a batch of viewports in a single engine reconfiguration.
    fn set_viewports(&mut self, inputs: &[ViewportInput]) -> Result<(), EngineError>;
    fn viewport(&self, viewport_id: &str) -> Option<ViewportHandle>;
    fn render_viewports(&self, viewport_ids: &[ViewportId]);
    fn resize(&mut self, reset_pan: bool, reset_zoom: bool);
    /// Binds volumes to viewports. With `immediate_render == false` nothing is
    /// drawn until the caller renders explicitly.
    fn bind_volumes(
        &mut self,
        volumes: &[VolumeInput],
        viewport_ids: &[ViewportId],
        immediate_render: bool,
    ) -> impl Future<Output = Result<(), EngineError>>;
}

/// One labelled cell of a layout grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    pub viewport_id: ViewportId,
    pub label: String,
    pub row: usize,
    pub col: usize,
}

/// Element tree hosting viewport canvases.
pub trait LayoutSurface {
    fn has_container(&self) -> bool;
    /// Removes every element created by the previous layout.
    fn clear(&mut self);
    /// Builds a `rows x cols` grid with one element per cell. The returned
    /// [`Attachment`] resolves once the elements are attached and measurable.
    fn build_grid(
        &mut self,
        rows: usize,
        cols: usize,
        cells: &[GridCell],
    ) -> Result<Attachment, SurfaceError>;
    fn element_size(&self, element_id: &str) -> Option<CanvasSize>;
}

/// Readiness signal for elements created by [`LayoutSurface::build_grid`].
#[derive(Debug)]
pub struct Attachment {
    receiver: oneshot::Receiver<()>,
}

/// Completes the paired [`Attachment`].
#[derive(Debug)]
pub struct AttachmentNotifier {
    sender: oneshot::Sender<()>,
}

impl Attachment {
    pub fn pending() -> (Self, AttachmentNotifier) {
        let (sender, receiver) = oneshot::channel();
        (Self { receiver }, AttachmentNotifier { sender })
    }

    pub fn ready() -> Self {
        let (attachment, notifier) = Self::pending();
        notifier.notify();
        attachment
    }

    /// Waits up to `timeout` for the surface to confirm attachment.
    /// Returns `false` when the signal timed out or its notifier was dropped.
    pub async fn wait(self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.receiver).await,
            Ok(Ok(()))
        )
    }
}

impl AttachmentNotifier {
    pub fn notify(self) {
        let _ = self.sender.send(());
    }
}
