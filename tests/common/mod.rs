#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use rigpose::{
    game::controllers::{BoneControlMode, ControllerNode, LimbControl, SingleBoneControl},
    resource_system::file_formats::{meshfile, skeletonfile},
    LocalPose, RigConfig, SkeletalMesh, SkeletalRig, Skeleton,
};

fn joint(name: &str, parent: Option<u32>, translation: [f32; 3]) -> skeletonfile::Joint {
    skeletonfile::Joint {
        name: name.into(),
        parent,
        translation,
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    }
}

/// root -> upper -> lower -> end, one unit apart along +y. LOD 1 drops the end.
pub fn chain_skeleton_file() -> skeletonfile::Skeleton {
    skeletonfile::Skeleton {
        joints: vec![
            joint("root", None, [0.0, 0.0, 0.0]),
            joint("upper", Some(0), [0.0, 1.0, 0.0]),
            joint("lower", Some(1), [0.0, 1.0, 0.0]),
            joint("end", Some(2), [0.0, 1.0, 0.0]),
        ],
        lods: vec![vec![], vec![0, 1, 2]],
    }
}

fn vertex(y: f32, bones: [u8; 4], weights: [f32; 4]) -> meshfile::Vertex {
    meshfile::Vertex {
        position: [0.1, y, 0.0],
        tangent: [0.0, 0.0, 1.0],
        normal: [1.0, 0.0, 0.0, 1.0],
        uv: [0.0, y / 3.0],
        bones,
        weights,
    }
}

fn morph(name: &str, sign: f32) -> meshfile::Morph {
    meshfile::Morph {
        name: name.into(),
        lods: vec![vec![
            meshfile::MorphVertex { source_index: 3, position_delta: [0.1 * sign, 0.0, 0.0], normal_delta: [0.0, 0.2 * sign, 0.0] },
            meshfile::MorphVertex { source_index: 4, position_delta: [0.0, 0.0, 0.1 * sign], normal_delta: [0.0; 3] },
        ]],
    }
}

/// Three rigid and two soft vertices along the chain, plus opposite
/// "swell" and "shrink" morphs on the soft ones.
pub fn chain_mesh() -> Arc<SkeletalMesh> {
    let skeleton = Arc::new(Skeleton::from_file(&chain_skeleton_file()).unwrap());
    let file = meshfile::SkinnedMesh {
        skeleton: "chain.skeleton.json".into(),
        bone_count: 4,
        lods: vec![meshfile::Lod {
            chunks: vec![meshfile::Chunk {
                bone_map: vec![1, 2, 3],
                max_bone_influences: 2,
                rigid_vertices: vec![
                    vertex(1.2, [0, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                    vertex(2.2, [1, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                    vertex(3.2, [2, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                ],
                soft_vertices: vec![
                    vertex(2.0, [0, 1, 0, 0], [0.5, 0.5, 0.0, 0.0]),
                    vertex(2.9, [1, 2, 0, 0], [0.25, 0.75, 0.0, 0.0]),
                ],
            }],
        }],
        morphs: vec![morph("swell", 1.0), morph("shrink", -1.0)],
    };
    Arc::new(SkeletalMesh::from_file(&file, skeleton).unwrap())
}

pub fn reference_pose(skeleton: &Skeleton) -> LocalPose {
    skeleton.bones().iter().map(|bone| bone.reference).collect()
}

/// A rig with an IK reach on the upper bone and an additive twist on the end.
pub fn busy_rig(config: RigConfig) -> SkeletalRig {
    let mut rig = SkeletalRig::new(chain_mesh(), config);
    let reach = LimbControl::new(2, 3, Vec3::new(0.8, 2.4, 0.2), Vec3::new(1.0, 1.5, 0.0));
    rig.controllers_mut().add(1, ControllerNode::new(Box::new(reach))).unwrap();
    let twist = SingleBoneControl::rotation(Quat::from_rotation_y(0.6), BoneControlMode::Additive);
    rig.controllers_mut().add(3, ControllerNode::new(Box::new(twist))).unwrap();
    rig.set_morph_weight("swell", 0.7);
    rig
}

pub fn swinging_pose(skeleton: &Skeleton, frame: usize) -> LocalPose {
    let mut pose = reference_pose(skeleton);
    let t = frame as f32 * 0.1;
    pose[1].r = Quat::from_rotation_z(0.3 * t.sin());
    pose[2].r = Quat::from_rotation_x(0.5 * t.cos());
    pose
}

pub const OWNER: Mat4 = Mat4::IDENTITY;
