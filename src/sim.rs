use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::Sender;
use crossbeam_queue::SegQueue;
use generational_arena::Arena;
use glam::Mat4;

use crate::{
    config::SimConfig,
    game::{
        controllers::ControllerId,
        pose::LocalPose,
        rig::{RigFrameInput, RigFrameReport, SkeletalRig},
        root_motion::RootMotionDelta,
        skeleton::Skeleton,
    },
    job_system::worker_pool::{RigId, Task},
    render_snapshot::SnapshotHandoff,
    Result,
};

/// Stand-in for the animation graph: fills one local transform per bone.
pub trait PoseSource: Send {
    fn sample(&mut self, time: f32, skeleton: &Skeleton, out: &mut LocalPose);
}

impl<F> PoseSource for F
where
    F: FnMut(f32, &Skeleton, &mut LocalPose) + Send,
{
    fn sample(&mut self, time: f32, skeleton: &Skeleton, out: &mut LocalPose) {
        self(time, skeleton, out)
    }
}

/// Holds every bone at its reference transform.
pub struct ReferencePose;

impl PoseSource for ReferencePose {
    fn sample(&mut self, _time: f32, skeleton: &Skeleton, out: &mut LocalPose) {
        out.clear();
        out.extend(skeleton.bones().iter().map(|bone| bone.reference));
    }
}

#[derive(Debug)]
pub enum SimCommand {
    SetLod { rig: RigId, lod: usize },
    SetMorphWeight { rig: RigId, name: String, weight: f32 },
    SetControllerActive { rig: RigId, controller: ControllerId, active: bool },
    Remove(RigId),
    Exit,
}

pub struct SimRig {
    pub rig: SkeletalRig,
    /// owner transform, moved by root motion
    pub world: Mat4,
    source: Box<dyn PoseSource>,
    handoff: Arc<SnapshotHandoff>,
    pose: LocalPose,
    time: f32,
    last_report: Option<RigFrameReport>,
}

impl SimRig {
    pub fn handoff(&self) -> &Arc<SnapshotHandoff> {
        &self.handoff
    }

    pub fn last_report(&self) -> Option<&RigFrameReport> {
        self.last_report.as_ref()
    }
}

/// Producer side: every rig is advanced and published once per step.
#[derive(Default)]
pub struct Sim {
    rigs: Arena<SimRig>,
    frame: u64,
}

impl Sim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }

    pub fn insert(&mut self, rig: SkeletalRig, world: Mat4, source: Box<dyn PoseSource>) -> (RigId, Arc<SnapshotHandoff>) {
        let handoff = Arc::new(SnapshotHandoff::new());
        let id = self.rigs.insert(SimRig {
            rig,
            world,
            source,
            handoff: handoff.clone(),
            pose: LocalPose::new(),
            time: 0.0,
            last_report: None,
        });
        (id, handoff)
    }

    /// The consumer may still finish what was already published.
    pub fn remove(&mut self, id: RigId) -> Option<SkeletalRig> {
        let removed = self.rigs.remove(id)?;
        removed.handoff.close();
        Some(removed.rig)
    }

    pub fn get(&self, id: RigId) -> Option<&SimRig> {
        self.rigs.get(id)
    }

    pub fn get_mut(&mut self, id: RigId) -> Option<&mut SimRig> {
        self.rigs.get_mut(id)
    }

    /// Returns false on `Exit`.
    pub fn apply(&mut self, command: SimCommand) -> bool {
        match command {
            SimCommand::SetLod { rig, lod } => {
                if let Some(entry) = self.rigs.get_mut(rig) {
                    entry.rig.set_lod(lod);
                }
            }
            SimCommand::SetMorphWeight { rig, name, weight } => {
                if let Some(entry) = self.rigs.get_mut(rig) {
                    if !entry.rig.set_morph_weight(&name, weight) {
                        log::warn!("rig {rig:?} has no morph named '{name}'");
                    }
                }
            }
            SimCommand::SetControllerActive { rig, controller, active } => {
                if let Some(entry) = self.rigs.get_mut(rig) {
                    entry.rig.controllers_mut().set_active(controller, active);
                }
            }
            SimCommand::Remove(rig) => {
                self.remove(rig);
            }
            SimCommand::Exit => return false,
        }
        true
    }

    /// Advances every rig by `dt`, publishes its snapshot and wakes a consumer.
    pub fn step(&mut self, dt: f32, tasks: &Sender<Task>) {
        self.frame += 1;
        for (id, entry) in self.rigs.iter_mut() {
            entry.time += dt;
            entry.source.sample(entry.time, entry.rig.skeleton(), &mut entry.pose);

            let report = entry.rig.update(&RigFrameInput::new(&entry.pose, entry.world, dt));
            // accumulated motion is older than this frame's applied motion
            let motion = entry.rig.consume_root_motion().then(&report.root_motion.applied);
            entry.world = apply_root_motion(&entry.world, &motion);
            entry.last_report = Some(report);

            if !entry.handoff.publish(entry.rig.build_snapshot()) {
                continue;
            }
            if tasks.send(Task::Skin { rig: id, handoff: entry.handoff.clone() }).is_err() {
                log::trace!("no consumer listening for rig {id:?}");
            }
        }
    }

    pub fn close_all(&self) {
        for (_, entry) in self.rigs.iter() {
            entry.handoff.close();
        }
    }
}

/// Moves the owner by a world-space root motion delta.
pub fn apply_root_motion(world: &Mat4, delta: &RootMotionDelta) -> Mat4 {
    if delta.is_zero() {
        return *world;
    }
    let (scale, rotation, translation) = world.to_scale_rotation_translation();
    Mat4::from_scale_rotation_translation(scale, (delta.rotation * rotation).normalize(), translation + delta.translation)
}

const SPIN: Duration = Duration::from_micros(200);

/// Runs `sim` at the configured tick until `Exit` or `max_frames`, then
/// closes every handoff and hands the sim back.
pub fn spawn_sim(
    mut sim: Sim,
    commands: Arc<SegQueue<SimCommand>>,
    tasks: Sender<Task>,
    config: &SimConfig,
    max_frames: Option<u64>,
) -> Result<thread::JoinHandle<Sim>> {
    let tick = Duration::from_secs_f64(1.0 / config.tick_hz.max(1) as f64);
    let handle = thread::Builder::new().name("sim".into()).spawn(move || {
        log::info!("sim started, tick {tick:?}");
        let mut next = Instant::now() + tick;
        'sim: loop {
            while let Some(command) = commands.pop() {
                if !sim.apply(command) {
                    break 'sim;
                }
            }
            if max_frames.is_some_and(|max| sim.frame() >= max) {
                break;
            }

            sim.step(tick.as_secs_f32(), &tasks);

            next += tick;

            // sleep most of the remaining time, then spin the last bit
            let now = Instant::now();
            if next > now {
                let remain = next - now;
                if remain > SPIN {
                    thread::sleep(remain - SPIN);
                }
                while Instant::now() < next {
                    std::hint::spin_loop();
                }
            }
        }
        sim.close_all();
        log::info!("sim stopped after {} frames", sim.frame());
        sim
    })?;
    Ok(handle)
}
