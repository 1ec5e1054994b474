use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::{render_snapshot::DynamicSnapshot, RigConfig};

use super::{
    composer::{reference_to_current, ComposeInput, Composer, PhysicsOverride},
    controllers::{ControllerTable, FrameContext},
    mesh::SkeletalMesh,
    morph::{accumulate_morphs, ActiveMorph, MorphDeltas},
    pose::{ComponentPose, LocalPose, Trs},
    required_bones::RequiredBonesCache,
    root_motion::{RootMotionDelta, RootMotionExtractor, RootMotionFrame},
    skeleton::Skeleton,
};

/// What the owner hands the rig each frame.
pub struct RigFrameInput<'a> {
    /// one transform per skeleton bone, from the animation graph
    pub local_pose: &'a [Trs],
    /// owner transform, only its rotation is used
    pub world: Mat4,
    pub dt: f32,
    pub has_movement_authority: bool,
    pub recently_rendered: bool,
    pub physics: Option<&'a PhysicsOverride>,
}

impl<'a> RigFrameInput<'a> {
    pub fn new(local_pose: &'a [Trs], world: Mat4, dt: f32) -> Self {
        Self {
            local_pose,
            world,
            dt,
            has_movement_authority: true,
            recently_rendered: true,
            physics: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigFrameReport {
    pub generation: u64,
    pub lod: usize,
    pub root_motion: RootMotionFrame,
    /// root bone translation relative to its reference pose
    pub root_offset: Vec3,
}

/// Producer-side state of one skinned object.
pub struct SkeletalRig {
    mesh: Arc<SkeletalMesh>,
    config: RigConfig,
    generation: u64,
    lod: usize,
    local: LocalPose,
    component: ComponentPose,
    ref_to_current: Vec<Mat4>,
    required: RequiredBonesCache,
    extra_required: Vec<usize>,
    extra_revision: u64,
    controllers: ControllerTable,
    composer: Composer,
    root_motion: RootMotionExtractor,
    /// one weight per mesh morph
    morph_weights: Vec<f32>,
    active_morphs: Vec<ActiveMorph>,
    morph_deltas: MorphDeltas,
}

impl SkeletalRig {
    pub fn new(mesh: Arc<SkeletalMesh>, config: RigConfig) -> Self {
        let skeleton = &mesh.skeleton;
        let local = skeleton.bones().iter().map(|bone| bone.reference).collect();
        let component = skeleton.reference_component().to_vec();
        let ref_to_current = vec![Mat4::IDENTITY; skeleton.bone_count()];
        let controllers = ControllerTable::new(skeleton.bone_count());
        let root_motion = RootMotionExtractor::new(&config.root_motion);
        let morph_weights = vec![0.0; mesh.morphs.len()];
        Self {
            mesh,
            config,
            generation: 0,
            lod: 0,
            local,
            component,
            ref_to_current,
            required: RequiredBonesCache::default(),
            extra_required: Vec::new(),
            extra_revision: 0,
            controllers,
            composer: Composer::default(),
            root_motion,
            morph_weights,
            active_morphs: Vec::new(),
            morph_deltas: MorphDeltas::default(),
        }
    }

    pub fn mesh(&self) -> &Arc<SkeletalMesh> {
        &self.mesh
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.mesh.skeleton
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Swaps the mesh asset. Controllers are kept only when the bone count
    /// matches, morph weights are reset.
    pub fn set_mesh(&mut self, mesh: Arc<SkeletalMesh>) {
        let bones = mesh.skeleton.bone_count();
        if bones != self.skeleton().bone_count() {
            log::warn!("mesh swap changes bone count {} -> {bones}, controllers dropped", self.skeleton().bone_count());
            self.controllers = ControllerTable::new(bones);
            self.extra_required.retain(|&b| b < bones);
        }
        self.morph_weights = vec![0.0; mesh.morphs.len()];
        self.mesh = mesh;
        self.required.invalidate();
        self.root_motion.reset();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    /// Out of range LODs are clamped when the frame is evaluated.
    pub fn set_lod(&mut self, lod: usize) {
        self.lod = lod;
    }

    /// Bones that must be evaluated at every LOD, e.g. for mirroring or
    /// attached physics bodies.
    pub fn set_extra_required_bones(&mut self, bones: Vec<usize>) {
        if bones != self.extra_required {
            self.extra_required = bones;
            self.extra_revision += 1;
        }
    }

    pub fn controllers(&self) -> &ControllerTable {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerTable {
        &mut self.controllers
    }

    pub fn root_motion(&self) -> &RootMotionExtractor {
        &self.root_motion
    }

    pub fn root_motion_mut(&mut self) -> &mut RootMotionExtractor {
        &mut self.root_motion
    }

    /// Owner movement step: everything accumulated since the last call.
    pub fn consume_root_motion(&mut self) -> RootMotionDelta {
        self.root_motion.consume()
    }

    /// Returns false when the mesh has no morph called `name`.
    pub fn set_morph_weight(&mut self, name: &str, weight: f32) -> bool {
        match self.mesh.morphs.iter().position(|m| m.name == name) {
            Some(idx) => {
                self.morph_weights[idx] = weight;
                true
            }
            None => false,
        }
    }

    pub fn clear_morphs(&mut self) {
        self.morph_weights.iter_mut().for_each(|w| *w = 0.0);
    }

    pub fn component_pose(&self) -> &[Mat4] {
        &self.component
    }

    pub fn ref_to_current(&self) -> &[Mat4] {
        &self.ref_to_current
    }

    pub fn morph_deltas(&self) -> &MorphDeltas {
        &self.morph_deltas
    }

    /// Runs one producer frame: root motion, pose composition and morph accumulation.
    pub fn update(&mut self, input: &RigFrameInput) -> RigFrameReport {
        self.generation += 1;
        let skeleton = self.mesh.skeleton.clone();
        let required = self.required.get(&skeleton, self.lod, &self.extra_required, self.extra_revision);
        let frame = FrameContext {
            generation: self.generation,
            dt: input.dt,
            lod: required.lod(),
            recently_rendered: input.recently_rendered,
        };

        self.local.clear();
        self.local.extend_from_slice(input.local_pose);

        // root motion reads the animated root before it gets locked
        let reference_root = skeleton.bone(0).reference;
        let root = self.local.first().copied().unwrap_or(reference_root);
        let root_motion = self.root_motion.update(&root, &input.world, input.dt, input.has_movement_authority);
        if let Some(root) = self.local.first_mut() {
            self.root_motion.lock_root(root, &reference_root);
        }

        let compose_input = ComposeInput {
            skeleton: &skeleton,
            required,
            frame: &frame,
            config: &self.config.controllers,
            physics: input.physics,
        };
        self.composer.compose(&compose_input, &mut self.local, Some(&mut self.controllers), &mut self.component);
        reference_to_current(&skeleton, &self.component, &mut self.ref_to_current);

        let mesh_lod = self.mesh.clamp_lod(self.lod);
        self.active_morphs.clear();
        for (morph, &weight) in self.mesh.morphs.iter().zip(&self.morph_weights) {
            if weight != 0.0 {
                self.active_morphs.push(ActiveMorph::new(morph.clone(), weight));
            }
        }
        self.morph_deltas = accumulate_morphs(&self.active_morphs, mesh_lod, &self.config.morph);

        let root_offset = self.component[0].w_axis.truncate() - skeleton.reference_component()[0].w_axis.truncate();
        RigFrameReport {
            generation: self.generation,
            lod: mesh_lod,
            root_motion,
            root_offset,
        }
    }

    /// Freezes the last `update` into an immutable snapshot for the consumer.
    pub fn build_snapshot(&self) -> DynamicSnapshot {
        DynamicSnapshot {
            generation: self.generation,
            mesh: self.mesh.clone(),
            lod: self.mesh.clamp_lod(self.lod),
            component_pose: self.component.clone(),
            ref_to_current: self.ref_to_current.clone(),
            active_morphs: self.active_morphs.clone(),
            morph_deltas: self.morph_deltas.clone(),
        }
    }
}
