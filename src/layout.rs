use std::collections::{HashMap, HashSet};

use tracing::trace;
use web_time::{SystemTime, UNIX_EPOCH};

use crate::camera::{Camera, ViewportId, VoiRange, VolumeId};
use crate::enums::Orientation;
use crate::viewport::Viewport;

/// Fixed semantic arrangements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// One volume, three panes: axial, sagittal, coronal.
    Mpr,
    /// Two volumes in a 2x3 grid, one MPR triplet per row.
    DualSequenceMpr,
}

impl Protocol {
    pub fn viewport_count(self) -> usize {
        match self {
            Protocol::Mpr => 3,
            Protocol::DualSequenceMpr => 6,
        }
    }

    pub fn grid(self) -> (usize, usize) {
        match self {
            Protocol::Mpr => (1, 3),
            Protocol::DualSequenceMpr => (2, 3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutSpec {
    Grid { rows: usize, cols: usize },
    Protocol(Protocol),
}

impl LayoutSpec {
    pub fn viewport_count(self) -> usize {
        match self {
            LayoutSpec::Grid { rows, cols } => rows * cols,
            LayoutSpec::Protocol(protocol) => protocol.viewport_count(),
        }
    }

    pub fn grid(self) -> (usize, usize) {
        match self {
            LayoutSpec::Grid { rows, cols } => (rows, cols),
            LayoutSpec::Protocol(protocol) => protocol.grid(),
        }
    }
}

/// Viewports of one layout that navigate together: the whole grid, or one
/// protocol triplet. Each group is an independent synchronization group,
/// even when two groups show the same volume.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportGroup {
    pub volume_id: VolumeId,
    pub viewport_ids: Vec<ViewportId>,
}

/// The arrangement currently applied by the manager.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub spec: LayoutSpec,
    pub viewport_ids: Vec<ViewportId>,
    pub orientations: Vec<Orientation>,
    pub groups: Vec<ViewportGroup>,
}

impl Layout {
    pub fn group_index_of(&self, viewport_id: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.viewport_ids.iter().any(|id| id == viewport_id))
    }

    pub fn volume_ids(&self) -> Vec<VolumeId> {
        self.groups
            .iter()
            .map(|group| group.volume_id.clone())
            .collect()
    }
}

/// Camera, window/level and orientation of a viewport captured before a
/// layout transition.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportStateSnapshot {
    pub viewport_id: ViewportId,
    pub camera: Camera,
    pub voi_range: Option<VoiRange>,
    pub orientation: Orientation,
}

impl ViewportStateSnapshot {
    pub fn capture(viewport: &dyn Viewport) -> Self {
        Self {
            viewport_id: viewport.id().to_string(),
            camera: viewport.camera(),
            voi_range: viewport.properties().voi_range,
            orientation: viewport.orientation(),
        }
    }
}

/// Snapshots of the outgoing layout, at most one per old viewport, in the
/// old layout's positional order.
#[derive(Clone, Debug, Default)]
pub struct SnapshotSet {
    by_position: Vec<Option<ViewportStateSnapshot>>,
    by_id: HashMap<ViewportId, usize>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the snapshot for the next old position. `None` keeps the
    /// position (so later indices stay aligned) without a snapshot.
    pub fn push(&mut self, snapshot: Option<ViewportStateSnapshot>) {
        if let Some(snapshot) = &snapshot {
            if self.by_id.contains_key(&snapshot.viewport_id) {
                trace!(viewport = %snapshot.viewport_id, "Duplicate snapshot ignored");
                self.by_position.push(None);
                return;
            }
            self.by_id
                .insert(snapshot.viewport_id.clone(), self.by_position.len());
        }
        self.by_position.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.by_position.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> Option<&ViewportStateSnapshot> {
        self.by_position.get(index).and_then(Option::as_ref)
    }

    /// Orientation recorded at `index` of the old layout.
    pub fn orientation_at(&self, index: usize) -> Option<Orientation> {
        self.at(index).map(|snapshot| snapshot.orientation)
    }

    /// Snapshot to restore onto a new viewport: the one with the same id if
    /// the id was reused, otherwise the one at the same position.
    pub fn for_new_viewport(&self, viewport_id: &str, index: usize) -> Option<&ViewportStateSnapshot> {
        self.by_id
            .get(viewport_id)
            .and_then(|&position| self.at(position))
            .or_else(|| self.at(index))
    }
}

/// Generates viewport identifiers that never collide with live ones.
#[derive(Debug)]
pub struct ViewportIdGenerator {
    prefix: String,
    counter: u64,
}

impl ViewportIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn next_id(&mut self, live: &HashSet<ViewportId>) -> ViewportId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        loop {
            self.counter += 1;
            let candidate = format!("{}-{millis}-{}", self.prefix, self.counter);
            if !live.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// `count` fresh identifiers, distinct from each other and from `live`.
    pub fn batch(&mut self, count: usize, live: &HashSet<ViewportId>) -> Vec<ViewportId> {
        let mut taken = live.clone();
        (0..count)
            .map(|_| {
                let id = self.next_id(&taken);
                taken.insert(id.clone());
                id
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    fn snapshot(id: &str, orientation: Orientation, z: f64) -> ViewportStateSnapshot {
        ViewportStateSnapshot {
            viewport_id: id.to_string(),
            camera: Camera {
                focal_point: DVec3::new(0.0, 0.0, z),
                position: DVec3::new(0.0, 0.0, z + 100.0),
                view_plane_normal: DVec3::Z,
                view_up: DVec3::Y,
                parallel_scale: 10.0,
            },
            voi_range: None,
            orientation,
        }
    }

    #[test]
    fn restores_by_id_before_position() {
        let mut snapshots = SnapshotSet::new();
        snapshots.push(Some(snapshot("a", Orientation::Axial, 1.0)));
        snapshots.push(Some(snapshot("b", Orientation::Coronal, 2.0)));

        assert_eq!(
            snapshots.for_new_viewport("b", 0).map(|s| s.viewport_id.as_str()),
            Some("b")
        );
        assert_eq!(
            snapshots.for_new_viewport("fresh", 0).map(|s| s.viewport_id.as_str()),
            Some("a")
        );
        assert!(snapshots.for_new_viewport("fresh", 2).is_none());
    }

    #[test]
    fn missing_snapshot_keeps_positions_aligned() {
        let mut snapshots = SnapshotSet::new();
        snapshots.push(None);
        snapshots.push(Some(snapshot("b", Orientation::Sagittal, 2.0)));

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots.orientation_at(0), None);
        assert_eq!(snapshots.orientation_at(1), Some(Orientation::Sagittal));
    }

    #[test]
    fn at_most_one_snapshot_per_viewport() {
        let mut snapshots = SnapshotSet::new();
        snapshots.push(Some(snapshot("a", Orientation::Axial, 1.0)));
        snapshots.push(Some(snapshot("a", Orientation::Axial, 5.0)));

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots.for_new_viewport("a", 1).unwrap().camera.focal_point.z, 1.0);
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut generator = ViewportIdGenerator::new("viewport");
        let first = generator.batch(4, &HashSet::new());
        let live: HashSet<_> = first.iter().cloned().collect();
        let second = generator.batch(4, &live);

        let all: HashSet<_> = first.iter().chain(&second).collect();
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn protocol_counts() {
        assert_eq!(LayoutSpec::Protocol(Protocol::Mpr).viewport_count(), 3);
        assert_eq!(LayoutSpec::Protocol(Protocol::DualSequenceMpr).viewport_count(), 6);
        assert_eq!(LayoutSpec::Grid { rows: 2, cols: 2 }.viewport_count(), 4);
    }
}
