//! Per-frame bone pose composition, vertex skinning and root motion for
//! articulated meshes.
//!
//! The producer side (`game`) turns local bone transforms into component-space
//! matrices, splices in procedural controllers, extracts root motion and
//! accumulates morph deltas. It freezes the result into a
//! [`render_snapshot::DynamicSnapshot`] which the consumer side (`main`)
//! skins on its own thread.

use thiserror::Error;

pub mod config;
pub mod game;
pub mod job_system;
pub mod main;
pub mod render_snapshot;
pub mod resource_system;
pub mod sim;

pub use config::RigConfig;
pub use game::composer::{compose, reference_to_current, ComposeInput, Composer, PhysicsOverride};
pub use game::controllers::{BoneController, ControllerNode, ControllerTable, FrameContext};
pub use game::mesh::{LodModel, SkeletalMesh, SkinChunk, SkinVertex};
pub use game::morph::{accumulate_morphs, ActiveMorph, MorphDeltas, MorphTarget};
pub use game::pose::{ComponentPose, LocalPose, Trs};
pub use game::required_bones::{select_required_bones, RequiredBones};
pub use game::rig::{RigFrameInput, RigFrameReport, SkeletalRig};
pub use game::root_motion::{RootMotionDelta, RootMotionExtractor};
pub use game::skeleton::{Bone, Skeleton};
pub use main::bones::BoneMat34;
pub use main::skinning::{skin, skin_into, Aabb, SkinnedVertex};
pub use render_snapshot::{DynamicSnapshot, SnapshotHandoff};

#[derive(Error, Debug)]
pub enum RigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("skeleton has no bones")]
    EmptySkeleton,

    #[error("bone {bone} has parent {parent}, parents must come before their children")]
    ParentNotBeforeChild { bone: usize, parent: usize },

    #[error("bone index {index} out of range for {count} bones")]
    InvalidBoneIndex { index: usize, count: usize },

    #[error("bone {0} has no parent, only bone 0 may be the root")]
    MultipleRoots(usize),

    #[error("duplicate bone name: {0}")]
    DuplicateBoneName(String),

    #[error("LOD {lod} out of range for {count} LODs")]
    InvalidLod { lod: usize, count: usize },

    #[error("required bones of LOD {lod} are not strictly increasing or miss the parent of bone {bone}")]
    NotParentClosed { lod: usize, bone: usize },

    #[error("mesh expects {expected} bones, skeleton has {actual}")]
    MeshSkeletonMismatch { expected: usize, actual: usize },

    #[error("invalid chunk {chunk}: {reason}")]
    InvalidChunk { chunk: usize, reason: String },

    #[error("morph '{morph}' LOD {lod}: vertices must be strictly increasing by source index")]
    UnsortedMorphVertices { morph: String, lod: usize },
}

pub type Result<T> = std::result::Result<T, RigError>;
