use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use arc_swap::ArcSwapOption;
use glam::Mat4;

use crate::game::{
    mesh::SkeletalMesh,
    morph::{ActiveMorph, MorphDeltas},
};

/// Everything the consumer needs to skin one rig for one frame. Immutable
/// once published.
pub struct DynamicSnapshot {
    /// producer frame this was built in, strictly increasing per rig
    pub generation: u64,
    pub mesh: Arc<SkeletalMesh>,
    /// mesh LOD to skin, already clamped to the mesh
    pub lod: usize,
    pub component_pose: Vec<Mat4>,
    /// `ComponentPose[i] * ReferenceInverse[i]`
    pub ref_to_current: Vec<Mat4>,
    pub active_morphs: Vec<ActiveMorph>,
    pub morph_deltas: MorphDeltas,
}

/// Single-slot, last-writer-wins handoff of one rig's snapshots.
///
/// Publishing replaces whatever the consumer has not picked up yet. An old
/// snapshot stays alive for as long as a consumer still holds its `Arc`.
pub struct SnapshotHandoff {
    slot: ArcSwapOption<DynamicSnapshot>,
    consumed: AtomicU64,
    closed: AtomicBool,
}

impl Default for SnapshotHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHandoff {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            consumed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Producer: replaces the current snapshot. Returns false once closed.
    pub fn publish(&self, snap: DynamicSnapshot) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.slot.store(Some(Arc::new(snap)));
        true
    }

    /// Latest published snapshot, consumed or not.
    pub fn latest(&self) -> Option<Arc<DynamicSnapshot>> {
        self.slot.load_full()
    }

    /// Consumer: the latest snapshot if no consumer has taken it (or a newer
    /// one) yet. Safe to race from several consumer threads.
    pub fn take_unconsumed(&self) -> Option<Arc<DynamicSnapshot>> {
        let snap = self.slot.load_full()?;
        let previous = self.consumed.fetch_max(snap.generation, Ordering::AcqRel);
        if previous >= snap.generation {
            log::trace!("snapshot {} already consumed", snap.generation);
            return None;
        }
        Some(snap)
    }

    /// The owner is gone. Already published snapshots can still be taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
