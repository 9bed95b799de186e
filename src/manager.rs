//! Ownership of the viewport set across layout changes.
//!
//! A layout transition runs strictly in sequence: snapshot the outgoing
//! viewports, build the new element grid, release the old engine viewports,
//! register the new ones in one batch, bind volumes, restore the snapshots,
//! then render once. Transitions take `&mut self`, so two of them can never
//! be in flight on the same manager.

use std::collections::HashSet;

use glam::DVec3;
use tracing::{debug, info, warn};

use crate::annotation::{Annotation, AnnotationStore};
use crate::camera::{CanvasSize, PropertiesUpdate, ViewportId, VolumeId};
use crate::config::MprConfig;
use crate::enums::{Orientation, SlabMode};
use crate::error::{EngineError, LayoutError, SurfaceError};
use crate::layout::{
    Layout, LayoutSpec, Protocol, SnapshotSet, ViewportGroup, ViewportIdGenerator,
    ViewportStateSnapshot,
};
use crate::navigation::{
    NavigationOutcome, SkipReason, jump_to_annotation_using_camera, resolve_triplet,
};
use crate::overlay::SvgLayerCache;
use crate::reference_lines::{ReferenceLine, calculate_reference_lines};
use crate::sync::Synchronizer;
use crate::viewport::{
    GridCell, LayoutSurface, RenderingEngine, Viewport, ViewportHandle, ViewportInput, VolumeInput,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutPhase {
    /// No transition is running.
    Idle,
    /// Elements and engine viewports for `LayoutSpec` are being created.
    Building(LayoutSpec),
    /// Volumes are bound; state restoration and the first render are pending.
    Bound,
}

/// How a cell of the new layout gets its orientation.
#[derive(Clone, Copy, Debug)]
enum OrientationRule {
    /// Round-robin by position unless the outgoing viewport at the same
    /// position had a recorded orientation.
    FromSnapshotOr(Orientation),
    Fixed(Orientation),
}

#[derive(Clone, Debug)]
struct CellPlan {
    volume_id: VolumeId,
    /// Synchronization group the cell joins.
    group: usize,
    orientation: OrientationRule,
}

pub struct DynamicViewportManager<E, S> {
    config: MprConfig,
    engine: Option<E>,
    surface: Option<S>,
    phase: LayoutPhase,
    layout: Option<Layout>,
    synchronizer: Synchronizer,
    id_generator: ViewportIdGenerator,
    snapshots: SnapshotSet,
    /// Viewports registered by the transition currently (or last) in flight.
    in_flight: Vec<ViewportId>,
}

impl<E: RenderingEngine, S: LayoutSurface> DynamicViewportManager<E, S> {
    pub fn new(config: MprConfig) -> Self {
        let id_generator = ViewportIdGenerator::new(config.layout.id_prefix.clone());
        Self {
            config,
            engine: None,
            surface: None,
            phase: LayoutPhase::Idle,
            layout: None,
            synchronizer: Synchronizer::new(),
            id_generator,
            snapshots: SnapshotSet::new(),
            in_flight: Vec::new(),
        }
    }

    /// Hands the engine and the layout surface to the manager.
    pub fn init(&mut self, engine: E, surface: S) {
        self.engine = Some(engine);
        self.surface = Some(surface);
        self.phase = LayoutPhase::Idle;
        debug!("Viewport manager initialized");
    }

    /// Releases every viewport, clears tracked state and gives the engine back.
    ///
    /// Later calls against the manager find no engine and do nothing.
    pub fn destroy(&mut self) -> Option<E> {
        self.synchronizer.clear();
        let tracked: Vec<ViewportId> = self
            .layout
            .take()
            .map(|layout| layout.viewport_ids)
            .unwrap_or_default()
            .into_iter()
            .chain(self.in_flight.drain(..))
            .collect();
        if let Some(engine) = self.engine.as_mut() {
            disable_all(engine, &tracked);
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.clear();
        }
        self.surface = None;
        self.snapshots = SnapshotSet::new();
        self.phase = LayoutPhase::Idle;
        debug!("Viewport manager destroyed");
        self.engine.take()
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some() && self.surface.is_some()
    }

    pub fn config(&self) -> &MprConfig {
        &self.config
    }

    pub fn phase(&self) -> LayoutPhase {
        self.phase
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn viewport_ids(&self) -> &[ViewportId] {
        self.layout
            .as_ref()
            .map(|layout| layout.viewport_ids.as_slice())
            .unwrap_or_default()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Snapshots taken before the most recent transition.
    pub fn snapshots(&self) -> &SnapshotSet {
        &self.snapshots
    }

    pub fn viewport(&self, viewport_id: &str) -> Option<ViewportHandle> {
        self.engine.as_ref()?.viewport(viewport_id)
    }

    /// Replaces the current layout with a `rows x cols` grid showing `volume_id`.
    ///
    /// Returns the new viewport ids; ids of the previous layout are invalid
    /// afterwards.
    pub async fn apply_grid_layout(
        &mut self,
        rows: usize,
        cols: usize,
        volume_id: &str,
        current_viewport_ids: &[ViewportId],
    ) -> Result<Vec<ViewportId>, LayoutError> {
        if rows == 0 || cols == 0 {
            return Err(LayoutError::InvalidGrid { rows, cols });
        }
        let cells = (0..rows * cols)
            .map(|index| CellPlan {
                volume_id: volume_id.to_string(),
                group: 0,
                orientation: OrientationRule::FromSnapshotOr(Orientation::round_robin(index)),
            })
            .collect();
        self.transition(LayoutSpec::Grid { rows, cols }, cells, current_viewport_ids)
            .await
    }

    /// Three-pane MPR of one volume: axial, sagittal, coronal.
    pub async fn apply_mpr_layout(
        &mut self,
        volume_id: &str,
        current_viewport_ids: &[ViewportId],
    ) -> Result<Vec<ViewportId>, LayoutError> {
        let cells = (0..3)
            .map(|index| CellPlan {
                volume_id: volume_id.to_string(),
                group: 0,
                orientation: OrientationRule::Fixed(Orientation::round_robin(index)),
            })
            .collect();
        self.transition(LayoutSpec::Protocol(Protocol::Mpr), cells, current_viewport_ids)
            .await
    }

    /// Six-pane layout with one MPR triplet per volume. The triplets are
    /// independent synchronization groups.
    pub async fn apply_dual_sequence_mpr_layout(
        &mut self,
        first_volume_id: &str,
        second_volume_id: &str,
        current_viewport_ids: &[ViewportId],
    ) -> Result<Vec<ViewportId>, LayoutError> {
        let cells = [first_volume_id, second_volume_id]
            .into_iter()
            .enumerate()
            .flat_map(|(group, volume_id)| {
                (0..3).map(move |index| CellPlan {
                    volume_id: volume_id.to_string(),
                    group,
                    orientation: OrientationRule::Fixed(Orientation::round_robin(index)),
                })
            })
            .collect();
        self.transition(
            LayoutSpec::Protocol(Protocol::DualSequenceMpr),
            cells,
            current_viewport_ids,
        )
        .await
    }

    async fn transition(
        &mut self,
        spec: LayoutSpec,
        cells: Vec<CellPlan>,
        current_viewport_ids: &[ViewportId],
    ) -> Result<Vec<ViewportId>, LayoutError> {
        let (rows, cols) = spec.grid();
        let Self {
            config,
            engine,
            surface,
            phase,
            layout,
            synchronizer,
            id_generator,
            snapshots,
            in_flight,
        } = self;
        let (Some(engine), Some(surface)) = (engine.as_mut(), surface.as_mut()) else {
            return Err(LayoutError::NotInitialized);
        };
        if !surface.has_container() {
            return Err(SurfaceError::MissingContainer.into());
        }

        if let LayoutPhase::Building(abandoned) = *phase {
            warn!(
                layout = ?abandoned,
                viewports = in_flight.len(),
                "Previous layout transition was abandoned, releasing its viewports"
            );
            disable_all(engine, in_flight);
        }
        in_flight.clear();

        let outgoing: Vec<ViewportId> = if current_viewport_ids.is_empty() {
            layout
                .as_ref()
                .map(|layout| layout.viewport_ids.clone())
                .unwrap_or_default()
        } else {
            current_viewport_ids.to_vec()
        };

        // 1. Snapshot outgoing state.
        let mut captured = SnapshotSet::new();
        for viewport_id in &outgoing {
            captured.push(
                engine
                    .viewport(viewport_id)
                    .map(|viewport| ViewportStateSnapshot::capture(viewport.as_ref())),
            );
        }
        debug!(snapshots = captured.len(), "Captured outgoing viewport state");

        // 2. Fresh identifiers.
        let live: HashSet<ViewportId> = outgoing
            .iter()
            .chain(layout.iter().flat_map(|layout| layout.viewport_ids.iter()))
            .cloned()
            .collect();
        let new_ids = id_generator.batch(cells.len(), &live);
        *phase = LayoutPhase::Building(spec);
        synchronizer.clear();

        // 3. Rebuild the element grid and wait for it to attach.
        let orientations: Vec<Orientation> = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| match cell.orientation {
                OrientationRule::Fixed(orientation) => orientation,
                OrientationRule::FromSnapshotOr(fallback) => {
                    captured.orientation_at(index).unwrap_or(fallback)
                }
            })
            .collect();
        let grid_cells: Vec<GridCell> = new_ids
            .iter()
            .zip(&orientations)
            .enumerate()
            .map(|(index, (viewport_id, orientation))| GridCell {
                viewport_id: viewport_id.clone(),
                label: orientation.label().to_string(),
                row: index / cols,
                col: index % cols,
            })
            .collect();
        surface.clear();
        let attachment = match surface.build_grid(rows, cols, &grid_cells) {
            Ok(attachment) => attachment,
            Err(error) => {
                *phase = LayoutPhase::Idle;
                return Err(error.into());
            }
        };
        if !attachment.wait(config.layout.attach_timeout()).await {
            warn!(
                timeout_ms = config.layout.attach_timeout_ms,
                "Layout elements did not confirm attachment, continuing"
            );
        }

        // 4. Release the outgoing engine viewports.
        let released: Vec<ViewportId> = live.into_iter().collect();
        disable_all(engine, &released);
        *layout = None;

        // 5. and 6. Register every new viewport in one engine call.
        let inputs: Vec<ViewportInput> = new_ids
            .iter()
            .zip(&orientations)
            .map(|(viewport_id, &orientation)| ViewportInput {
                viewport_id: viewport_id.clone(),
                element_id: viewport_id.clone(),
                orientation,
                canvas: surface.element_size(viewport_id).unwrap_or_else(|| {
                    warn!(viewport = %viewport_id, "Element has no size yet");
                    CanvasSize::new(0.0, 0.0)
                }),
            })
            .collect();
        in_flight.extend(new_ids.iter().cloned());
        if let Err(error) = engine.set_viewports(&inputs) {
            abort_transition(engine, phase, in_flight);
            return Err(error.into());
        }

        // 7. Bind each group's volume without rendering.
        let groups = group_cells(&cells, &new_ids);
        for group in &groups {
            let volumes = [VolumeInput {
                volume_id: group.volume_id.clone(),
            }];
            if let Err(error) = engine
                .bind_volumes(&volumes, &group.viewport_ids, false)
                .await
            {
                warn!(volume = %group.volume_id, %error, "Volume binding failed");
                abort_transition(engine, phase, in_flight);
                return Err(error.into());
            }
        }
        *phase = LayoutPhase::Bound;

        // 8. Restore outgoing state onto the new viewports.
        for (index, viewport_id) in new_ids.iter().enumerate() {
            let Some(snapshot) = captured.for_new_viewport(viewport_id, index) else {
                continue;
            };
            if let Some(viewport) = engine.viewport(viewport_id) {
                restore_snapshot(viewport.as_ref(), snapshot);
            }
        }

        for group in &groups {
            let members: Vec<ViewportHandle> = group
                .viewport_ids
                .iter()
                .filter_map(|viewport_id| engine.viewport(viewport_id))
                .collect();
            synchronizer.add_group(group.volume_id.clone(), &members);
        }

        // 9. One render pass.
        engine.render_viewports(&new_ids);

        info!(
            layout = ?spec,
            viewports = new_ids.len(),
            restored = captured.len(),
            "Layout applied"
        );
        *layout = Some(Layout {
            spec,
            viewport_ids: new_ids.clone(),
            orientations,
            groups,
        });
        *snapshots = captured;
        in_flight.clear();
        *phase = LayoutPhase::Idle;
        Ok(new_ids)
    }

    /// Moves the focal point of `viewport_id`; siblings follow through their
    /// synchronization group. Unknown ids are ignored.
    pub fn set_focal_point(&self, viewport_id: &str, focal_point: DVec3) -> bool {
        let Some(viewport) = self.viewport(viewport_id) else {
            return false;
        };
        viewport.set_camera(viewport.camera().with_focal_point(focal_point));
        viewport.render();
        true
    }

    /// Steps `viewport_id` by `slices` along its slice normal, one voxel
    /// spacing per step.
    pub fn scroll(&self, viewport_id: &str, slices: i32) -> bool {
        let Some(viewport) = self.viewport(viewport_id) else {
            return false;
        };
        let Some(geometry) = viewport.image_geometry() else {
            return false;
        };
        let camera = viewport.camera();
        let axis = viewport.orientation().normal_axis();
        let mut focal_point = camera.focal_point;
        focal_point[axis] += f64::from(slices) * geometry.spacing[axis];
        self.set_focal_point(viewport_id, focal_point)
    }

    /// Applies slab thickness and projection mode to every viewport showing
    /// `volume_id`.
    pub fn set_slab(&self, volume_id: &str, thickness: f64, mode: SlabMode) -> usize {
        self.synchronizer.set_slab(volume_id, thickness, mode)
    }

    /// Reference lines of every sibling's slice plane drawn into `target_id`.
    pub fn reference_lines(&self, target_id: &str) -> Vec<ReferenceLine> {
        let Some(target) = self.viewport(target_id) else {
            return Vec::new();
        };
        let Some(group) = self.synchronizer.group_of(target_id) else {
            return Vec::new();
        };
        group
            .member_ids()
            .filter(|id| *id != target_id)
            .filter_map(|id| self.viewport(id))
            .flat_map(|active| {
                calculate_reference_lines(
                    active.as_ref(),
                    target.as_ref(),
                    &self.config.reference_lines,
                )
            })
            .collect()
    }

    /// Redraws `target_id`'s overlay layer and returns its markup.
    pub fn render_reference_overlay(
        &self,
        target_id: &str,
        cache: &mut SvgLayerCache,
    ) -> Option<String> {
        let canvas = self.viewport(target_id)?.canvas_size()?;
        cache.update(&self.reference_lines(target_id));
        Some(cache.render_svg(canvas))
    }

    /// Brings `annotation` into view in the triplet it belongs to.
    pub fn jump_to_annotation(&self, annotation: &Annotation) -> NavigationOutcome {
        let Some(layout) = self.layout.as_ref() else {
            return NavigationOutcome::Skipped(SkipReason::NoViewport);
        };
        let triplet = resolve_triplet(annotation, &layout.volume_ids(), layout.viewport_ids.len());
        let Some(group) = layout.groups.get(triplet).or_else(|| layout.groups.first()) else {
            return NavigationOutcome::Skipped(SkipReason::NoViewport);
        };

        let candidates: Vec<ViewportHandle> = group
            .viewport_ids
            .iter()
            .filter_map(|viewport_id| self.viewport(viewport_id))
            .collect();
        let preferred = annotation
            .metadata
            .view_plane_normal
            .map(DVec3::from_array)
            .and_then(|normal| {
                candidates.iter().find(|viewport| {
                    let own = viewport.camera().view_plane_normal;
                    own.normalize_or_zero().dot(normal.normalize_or_zero()).abs() > 0.99
                })
            });
        let Some(viewport) = preferred.or_else(|| candidates.first()) else {
            warn!(annotation = %annotation.annotation_uid, "No viewport available for navigation");
            return NavigationOutcome::Skipped(SkipReason::NoViewport);
        };
        jump_to_annotation_using_camera(viewport.as_ref(), annotation, &self.config.navigation)
    }

    /// Looks `annotation_uid` up in `store` and navigates to it.
    pub fn jump_to_annotation_uid(
        &self,
        store: &impl AnnotationStore,
        annotation_uid: &str,
    ) -> NavigationOutcome {
        match store.annotation(annotation_uid) {
            Some(annotation) => self.jump_to_annotation(&annotation),
            None => {
                warn!(annotation = %annotation_uid, "Measurement not found");
                NavigationOutcome::Skipped(SkipReason::NoPoints)
            }
        }
    }

    /// Lets the engine adapt to new element sizes and redraws the layout.
    pub fn resize(&mut self) {
        let ids = self.viewport_ids().to_vec();
        if let Some(engine) = self.engine.as_mut() {
            engine.resize(true, false);
            engine.render_viewports(&ids);
        }
    }
}

fn group_cells(cells: &[CellPlan], viewport_ids: &[ViewportId]) -> Vec<ViewportGroup> {
    let mut groups: Vec<(usize, ViewportGroup)> = Vec::new();
    for (cell, viewport_id) in cells.iter().zip(viewport_ids) {
        match groups.iter_mut().find(|(group, _)| *group == cell.group) {
            Some((_, group)) => group.viewport_ids.push(viewport_id.clone()),
            None => groups.push((
                cell.group,
                ViewportGroup {
                    volume_id: cell.volume_id.clone(),
                    viewport_ids: vec![viewport_id.clone()],
                },
            )),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Reapplies a snapshot. The full camera is restored only when the
/// orientation matches; otherwise just the focal point carries over.
fn restore_snapshot(viewport: &dyn Viewport, snapshot: &ViewportStateSnapshot) {
    let orientation = viewport.orientation();
    viewport.set_properties(PropertiesUpdate {
        voi_range: snapshot.voi_range,
        ..Default::default()
    });
    let camera = if orientation == snapshot.orientation {
        snapshot.camera
    } else {
        viewport.camera().with_focal_point(snapshot.camera.focal_point)
    };
    viewport.set_camera(camera);
    debug!(
        from = %snapshot.viewport_id,
        to = %viewport.id(),
        "Restored viewport state"
    );
}

/// Disables each viewport, logging failures instead of propagating them.
fn disable_all<E: RenderingEngine>(engine: &mut E, viewport_ids: &[ViewportId]) {
    for viewport_id in viewport_ids {
        match engine.disable_viewport(viewport_id) {
            Ok(()) => {}
            Err(EngineError::UnknownViewport(_)) => {
                debug!(viewport = %viewport_id, "Viewport already released");
            }
            Err(error) => {
                warn!(viewport = %viewport_id, %error, "Failed to release viewport");
            }
        }
    }
}

fn abort_transition<E: RenderingEngine>(
    engine: &mut E,
    phase: &mut LayoutPhase,
    in_flight: &mut Vec<ViewportId>,
) {
    disable_all(engine, in_flight);
    in_flight.clear();
    *phase = LayoutPhase::Idle;
}
