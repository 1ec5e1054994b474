//! Drives a procedural arm through the producer and consumer threads.
//!
//! Usage: `rigpose-demo [config.json]`

use std::{f32::consts::TAU, sync::Arc};

use crossbeam_queue::SegQueue;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rigpose::{
    config::RootMotionConfig,
    game::{
        controllers::{ControlStrength, ControllerNode, LimbControl},
        mesh::{LodModel, SkeletalMesh, SkinChunk, SkinVertex},
        morph::{MorphTarget, MorphVertex},
        pose::{LocalPose, Trs},
        rig::SkeletalRig,
        root_motion::RootMotionMode,
        skeleton::{Bone, Skeleton},
    },
    job_system::worker_pool::{RenderResponse, WorkerPool},
    main::skinned_storage::{buffer_pool, SkinnedOutputStorage},
    sim::{spawn_sim, Sim, SimCommand},
    RigConfig,
};

const FRAMES: u64 = 240;
const RADIUS: f32 = 0.2;
const SEGMENTS: usize = 12;
const RINGS: usize = 17;

fn arm_skeleton() -> rigpose::Result<Skeleton> {
    let up = Vec3::Y;
    Skeleton::new(
        vec![
            Bone::new("root", None, Trs::IDENTITY),
            Bone::new("shoulder", Some(0), Trs::from_translation(up)),
            Bone::new("elbow", Some(1), Trs::from_translation(up)),
            Bone::new("wrist", Some(2), Trs::from_translation(up)),
        ],
        vec![vec![], vec![0, 1, 2]],
    )
}

fn ring(y: f32, bones: [u8; 4], weights: [f32; 4]) -> impl Iterator<Item = SkinVertex> {
    (0..SEGMENTS).map(move |seg| {
        let angle = seg as f32 / SEGMENTS as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        SkinVertex {
            position: Vec3::new(RADIUS * cos, y, RADIUS * sin),
            tangent: Vec3::new(-sin, 0.0, cos),
            normal: Vec4::new(cos, 0.0, sin, 1.0),
            uv: Vec2::new(seg as f32 / SEGMENTS as f32, (y - 1.0) / 2.0),
            influence_bones: bones,
            influence_weights: weights,
        }
    })
}

/// A cylinder from the shoulder to the wrist with a soft band around the
/// elbow, and a "bulge" morph that pushes the band outward.
fn arm_mesh(skeleton: Arc<Skeleton>) -> rigpose::Result<SkeletalMesh> {
    let heights: Vec<f32> = (0..RINGS).map(|i| 1.0 + 2.0 * i as f32 / (RINGS - 1) as f32).collect();
    let upper: Vec<f32> = heights.iter().copied().filter(|&y| y <= 1.75).collect();
    let lower: Vec<f32> = heights.iter().copied().filter(|&y| y >= 2.25).collect();
    let band: Vec<f32> = heights.iter().copied().filter(|&y| y > 1.75 && y < 2.25).collect();

    let mut vertices = Vec::new();
    for &y in &upper {
        vertices.extend(ring(y, [0; 4], [1.0, 0.0, 0.0, 0.0]));
    }
    for &y in &lower {
        vertices.extend(ring(y, [1, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]));
    }
    let num_rigid = vertices.len();
    let mut bulge = Vec::new();
    for &y in &band {
        let elbow = (y - 1.75) / 0.5;
        let first = vertices.len();
        vertices.extend(ring(y, [0, 1, 0, 0], [1.0 - elbow, elbow, 0.0, 0.0]));
        bulge.extend(vertices[first..].iter().enumerate().map(|(offset, v)| MorphVertex {
            source_index: (first + offset) as u32,
            position_delta: v.normal.truncate() * 0.05,
            normal_delta: Vec3::ZERO,
        }));
    }

    let chunk = SkinChunk::new(vec![1, 2], 2, 0, num_rigid, vertices.len() - num_rigid);
    let lod = LodModel::new(vec![chunk], vertices, skeleton.bone_count())?;
    let bulge = MorphTarget::new("bulge", vec![bulge])?;
    SkeletalMesh::new(skeleton, vec![lod], vec![Arc::new(bulge)])
}

/// Walks forward along +z while swinging the elbow.
fn walk_and_swing(time: f32, skeleton: &Skeleton, out: &mut LocalPose) {
    out.clear();
    out.extend(skeleton.bones().iter().map(|bone| bone.reference));
    out[0].t = Vec3::new(0.0, 0.0, time);
    out[2].r = Quat::from_rotation_z(0.8 * (time * 2.0).sin());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;

    let config = match std::env::args().nth(1) {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig {
            root_motion: RootMotionConfig { translation_mode: RootMotionMode::Accumulate, ..Default::default() },
            ..Default::default()
        },
    };

    let skeleton = Arc::new(arm_skeleton()?);
    let mesh = Arc::new(arm_mesh(skeleton)?);
    log::info!("arm mesh: {} vertices, {} bones", mesh.lod(0).num_vertices(), mesh.skeleton.bone_count());

    let mut rig = SkeletalRig::new(mesh, config.clone());
    let reach = LimbControl::new(2, 3, Vec3::new(0.9, 2.2, 0.3), Vec3::new(1.0, 1.2, 0.0));
    let node = ControllerNode::new(Box::new(reach)).with_strength(ControlStrength::new(0.0).with_blend_times(1.0, 1.0));
    let limb = rig.controllers_mut().add(1, node).ok_or("shoulder bone out of range")?;

    let pool = buffer_pool(config.skinning.recycled_buffers);
    let (workers, tasks, responses) = WorkerPool::spawn(&config.skinning, pool.clone())?;

    let mut sim = Sim::new();
    let (rig_id, _) = sim.insert(rig, Mat4::IDENTITY, Box::new(walk_and_swing));
    let commands = Arc::new(SegQueue::new());
    commands.push(SimCommand::SetMorphWeight { rig: rig_id, name: "bulge".into(), weight: 1.0 });
    commands.push(SimCommand::SetControllerActive { rig: rig_id, controller: limb, active: true });
    let sim_handle = spawn_sim(sim, commands, tasks, &config.sim, Some(FRAMES))?;

    // the render side: runs until the sim is done and the workers drained
    let mut storage = SkinnedOutputStorage::new(pool);
    let mut frame_idx = 0u32;
    for response in responses.iter() {
        let RenderResponse::Skinned(response) = response;
        storage.receive(response, frame_idx);
        if let Some(output) = storage.get(&rig_id, frame_idx) {
            if let (0, Some(bounds)) = (output.generation % 60, output.bounds) {
                log::info!(
                    "generation {}: bounds center {} extents {}",
                    output.generation,
                    bounds.center(),
                    bounds.extents()
                );
            }
        }
        storage.run_gc(frame_idx);
        frame_idx += 1;
    }

    let sim = sim_handle.join().map_err(|_| "sim thread panicked")?;
    workers.join();

    if let Some(entry) = sim.get(rig_id) {
        log::info!("owner moved to {}", entry.world.w_axis.truncate());
        if let Some(report) = entry.last_report() {
            log::info!("last root velocity {}", report.root_motion.velocity);
        }
    }
    log::info!("skinned {frame_idx} outputs");
    Ok(())
}
