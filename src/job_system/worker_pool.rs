use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use generational_arena::Index;

use crate::{
    config::SkinningConfig,
    main::{
        bones::{export_bones, BoneMat34},
        skinned_storage::BufferPool,
        skinning::{skin_snapshot_into, Aabb, SkinnedVertex},
    },
    render_snapshot::{DynamicSnapshot, SnapshotHandoff},
    Result,
};

pub type RigId = Index;

pub enum Task {
    /// A new snapshot may be waiting in `handoff`.
    Skin { rig: RigId, handoff: Arc<SnapshotHandoff> },
}

pub struct SkinnedResponse {
    pub rig: RigId,
    pub generation: u64,
    pub lod: usize,
    pub vertices: Vec<SkinnedVertex>,
    pub bounds: Option<Aabb>,
    pub bones: Vec<BoneMat34>,
}

pub enum RenderResponse {
    Skinned(SkinnedResponse),
}

/// Skins `snapshot` into a buffer taken from `pool`.
pub fn skin_response(rig: RigId, snapshot: &DynamicSnapshot, pool: &BufferPool, parallel: bool) -> SkinnedResponse {
    let mut vertices = pool.pop().unwrap_or_default();
    skin_snapshot_into(snapshot, parallel, &mut vertices);
    SkinnedResponse {
        rig,
        generation: snapshot.generation,
        lod: snapshot.lod,
        bounds: Aabb::from_vertices(&vertices),
        bones: export_bones(&snapshot.ref_to_current),
        vertices,
    }
}

fn worker_loop(rx: Receiver<Task>, render_tx: Sender<RenderResponse>, pool: BufferPool, parallel: bool) {
    while let Ok(task) = rx.recv() {
        match task {
            Task::Skin { rig, handoff } => {
                // an earlier notification already picked this snapshot up
                let Some(snapshot) = handoff.take_unconsumed() else {
                    continue;
                };
                let response = skin_response(rig, &snapshot, &pool, parallel);
                if render_tx.send(RenderResponse::Skinned(response)).is_err() {
                    log::info!("render side hung up, stopping worker");
                    return;
                }
            }
        }
    }
}

/// Consumer threads. They run until every `Sender<Task>` is dropped.
pub struct WorkerPool {
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(config: &SkinningConfig, pool: BufferPool) -> Result<(Self, Sender<Task>, Receiver<RenderResponse>)> {
        let (req_tx, req_rx) = crossbeam::channel::unbounded::<Task>();
        let (render_res_tx, render_res_rx) = crossbeam::channel::unbounded::<RenderResponse>();

        let threads = config.worker_threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for idx in 0..threads {
            let rx = req_rx.clone();
            let render_tx = render_res_tx.clone();
            let pool = pool.clone();
            let parallel = config.parallel;
            let handle = std::thread::Builder::new()
                .name(format!("skin-worker-{idx}"))
                .spawn(move || worker_loop(rx, render_tx, pool, parallel))?;
            workers.push(handle);
        }
        log::info!("spawned {threads} skinning worker(s), parallel chunks: {}", config.parallel);

        Ok((Self { workers }, req_tx, render_res_rx))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for the workers to drain. Drop the task sender first.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                log::warn!("skinning worker panicked");
            }
        }
        log::info!("skinning workers stopped");
    }
}
