//! Focal-point and slab synchronization between viewports showing one volume.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use glam::DVec3;
use tracing::{debug, trace};

use crate::camera::{PropertiesUpdate, ViewportId, VolumeId};
use crate::enums::SlabMode;
use crate::events::SubscriptionSet;
use crate::viewport::{Viewport, ViewportHandle};

struct GroupState {
    volume_id: VolumeId,
    members: Vec<(ViewportId, Weak<dyn Viewport>)>,
    last_known: RefCell<HashMap<ViewportId, DVec3>>,
    synchronizing: Cell<bool>,
    propagated: Cell<usize>,
}

/// Clears the synchronizing flag when the broadcast scope ends.
struct BroadcastScope<'a>(&'a Cell<bool>);

impl<'a> BroadcastScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for BroadcastScope<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl GroupState {
    fn live_member(&self, weak: &Weak<dyn Viewport>) -> Option<ViewportHandle> {
        weak.upgrade()
            .filter(|viewport| viewport.canvas_size().is_some())
    }

    fn on_camera_modified(&self, source_id: &str, focal_point: DVec3) -> usize {
        if self.synchronizing.get() {
            return 0;
        }
        if self.last_known.borrow().get(source_id) == Some(&focal_point) {
            return 0;
        }

        let _scope = BroadcastScope::enter(&self.synchronizing);
        let mut updated = 0;
        for (member_id, member) in &self.members {
            if member_id == source_id {
                continue;
            }
            let Some(viewport) = self.live_member(member) else {
                trace!(viewport = %member_id, "Skipping stale viewport");
                continue;
            };
            viewport.set_camera(viewport.camera().with_focal_point(focal_point));
            self.last_known
                .borrow_mut()
                .insert(member_id.clone(), focal_point);
            viewport.render();
            updated += 1;
        }
        self.last_known
            .borrow_mut()
            .insert(source_id.to_string(), focal_point);
        self.propagated.set(self.propagated.get() + updated);
        updated
    }
}

/// Viewports bound to the same volume that navigate together.
///
/// A focal point change in one member is broadcast to every other live
/// member. Members are held weakly; destroyed viewports are skipped.
pub struct SyncGroup {
    state: Rc<GroupState>,
    subscriptions: SubscriptionSet,
}

impl SyncGroup {
    /// Creates the group and starts listening to camera changes of `members`.
    pub fn new(volume_id: impl Into<VolumeId>, members: &[ViewportHandle]) -> Self {
        let last_known = members
            .iter()
            .map(|viewport| (viewport.id().to_string(), viewport.camera().focal_point))
            .collect();
        let state = Rc::new(GroupState {
            volume_id: volume_id.into(),
            members: members
                .iter()
                .map(|viewport| (viewport.id().to_string(), Rc::downgrade(viewport)))
                .collect(),
            last_known: RefCell::new(last_known),
            synchronizing: Cell::new(false),
            propagated: Cell::new(0),
        });

        let mut subscriptions = SubscriptionSet::new();
        for viewport in members {
            let state = Rc::downgrade(&state);
            subscriptions.add(viewport.on_camera_modified(Box::new(move |event| {
                if let Some(state) = state.upgrade() {
                    state.on_camera_modified(&event.viewport_id, event.camera.focal_point);
                }
            })));
        }

        Self {
            state,
            subscriptions,
        }
    }

    pub fn volume_id(&self) -> &str {
        &self.state.volume_id
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.state.members.iter().map(|(id, _)| id.as_str())
    }

    pub fn contains(&self, viewport_id: &str) -> bool {
        self.member_ids().any(|id| id == viewport_id)
    }

    pub fn is_listening(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Handles a focal point change reported by `viewport_id`.
    ///
    /// Returns the number of sibling viewports whose camera was updated:
    /// zero when the focal point did not change or a broadcast is already in
    /// progress.
    pub fn handle_camera_modified(&self, viewport_id: &str, focal_point: DVec3) -> usize {
        self.state.on_camera_modified(viewport_id, focal_point)
    }

    /// Total number of sibling camera updates performed by this group.
    pub fn propagated(&self) -> usize {
        self.state.propagated.get()
    }

    /// Applies slab thickness and projection mode to every live member.
    pub fn set_slab(&self, thickness: f64, mode: SlabMode) -> usize {
        let update = PropertiesUpdate {
            slab_thickness: Some(thickness),
            slab_mode: Some(mode),
            ..Default::default()
        };
        let mut applied = 0;
        for (_, member) in &self.state.members {
            if let Some(viewport) = self.state.live_member(member) {
                viewport.set_properties(update);
                viewport.render();
                applied += 1;
            }
        }
        applied
    }
}

/// The set of synchronization groups of the current layout.
#[derive(Default)]
pub struct Synchronizer {
    groups: Vec<SyncGroup>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, volume_id: impl Into<VolumeId>, members: &[ViewportHandle]) {
        let group = SyncGroup::new(volume_id, members);
        debug!(
            volume = %group.volume_id(),
            members = members.len(),
            "Synchronization group created"
        );
        self.groups.push(group);
    }

    /// Drops every group along with its listeners.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn groups(&self) -> &[SyncGroup] {
        &self.groups
    }

    pub fn group_of(&self, viewport_id: &str) -> Option<&SyncGroup> {
        self.groups.iter().find(|group| group.contains(viewport_id))
    }

    /// Applies slab settings to every group bound to `volume_id`.
    pub fn set_slab(&self, volume_id: &str, thickness: f64, mode: SlabMode) -> usize {
        self.groups
            .iter()
            .filter(|group| group.volume_id() == volume_id)
            .map(|group| group.set_slab(thickness, mode))
            .sum()
    }
}
