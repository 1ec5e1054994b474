use std::{collections::HashMap, sync::Arc};

use crossbeam_queue::ArrayQueue;
use generational_arena::{Arena, Index};

use crate::job_system::worker_pool::{RigId, SkinnedResponse};

use super::{bones::BoneMat34, skinning::{Aabb, SkinnedVertex}};

/// The latest skinned result of one rig, owned by the consumer.
pub struct SkinnedOutput {
    pub generation: u64,
    pub lod: usize,
    pub vertices: Vec<SkinnedVertex>,
    pub bounds: Option<Aabb>,
    pub bones: Vec<BoneMat34>,
}

struct OutputEntry {
    output: SkinnedOutput,
    last_seen: u32,
}

const OUTPUT_GC_GRACE_FRAMES: u32 = 60;

pub type BufferPool = Arc<ArrayQueue<Vec<SkinnedVertex>>>;

pub fn buffer_pool(capacity: usize) -> BufferPool {
    Arc::new(ArrayQueue::new(capacity.max(1)))
}

pub struct SkinnedOutputStorage {
    rig_to_entry: HashMap<RigId, Index>,
    entries: Arena<OutputEntry>,
    pool: BufferPool,
}

impl SkinnedOutputStorage {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            rig_to_entry: HashMap::new(),
            entries: Arena::new(),
            pool,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps the response if it is newer than what is stored for its rig.
    /// Whichever buffer loses goes back to the pool.
    pub fn receive(&mut self, res: SkinnedResponse, frame_idx: u32) {
        let output = SkinnedOutput {
            generation: res.generation,
            lod: res.lod,
            vertices: res.vertices,
            bounds: res.bounds,
            bones: res.bones,
        };

        let entry = self.rig_to_entry.get(&res.rig).and_then(|idx| self.entries.get_mut(*idx));
        match entry {
            Some(entry) if entry.output.generation >= output.generation => {
                log::trace!("dropping stale output {} for rig {:?}", output.generation, res.rig);
                entry.last_seen = frame_idx;
                recycle_buffer(&self.pool, output.vertices);
            }
            Some(entry) => {
                entry.last_seen = frame_idx;
                let stale = std::mem::replace(&mut entry.output, output);
                recycle_buffer(&self.pool, stale.vertices);
            }
            None => {
                let idx = self.entries.insert(OutputEntry { output, last_seen: frame_idx });
                self.rig_to_entry.insert(res.rig, idx);
            }
        }
    }

    pub fn get(&mut self, rig: &RigId, frame_idx: u32) -> Option<&SkinnedOutput> {
        let idx = self.rig_to_entry.get(rig)?;
        let entry = self.entries.get_mut(*idx)?;
        entry.last_seen = frame_idx;
        Some(&entry.output)
    }

    pub fn remove(&mut self, rig: &RigId) {
        if let Some(entry) = self.rig_to_entry.remove(rig).and_then(|idx| self.entries.remove(idx)) {
            self.recycle(entry.output.vertices);
        }
    }

    /// Drops outputs of rigs that were neither updated nor looked at for
    /// the grace period.
    pub fn run_gc(&mut self, frame_idx: u32) {
        let mut expired = Vec::new();
        self.entries.retain(|_idx, entry| {
            let keep = frame_idx.saturating_sub(entry.last_seen) < OUTPUT_GC_GRACE_FRAMES;
            if !keep {
                expired.push(std::mem::take(&mut entry.output.vertices));
            }
            keep
        });
        let entries = &self.entries;
        self.rig_to_entry.retain(|_rig, idx| entries.contains(*idx));
        for buffer in expired {
            self.recycle(buffer);
        }
    }

    /// Hands a vertex buffer back to the consumer threads.
    pub fn recycle(&self, buffer: Vec<SkinnedVertex>) {
        recycle_buffer(&self.pool, buffer);
    }
}

fn recycle_buffer(pool: &ArrayQueue<Vec<SkinnedVertex>>, buffer: Vec<SkinnedVertex>) {
    if buffer.capacity() > 0 {
        // full pool, let it drop
        let _ = pool.push(buffer);
    }
}
