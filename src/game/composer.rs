//! Local bone transforms to component-space matrices.
//!
//! Bones are evaluated in increasing index order, which the skeleton
//! guarantees is parent-first. Controller chains are spliced in right after
//! their bone is composed: targets are turned back into local transforms
//! relative to the parent, blended by strength, and the affected hierarchy is
//! recomposed so nothing downstream reads a stale matrix.

use glam::Mat4;

use crate::config::ControllerConfig;

use super::{
    controllers::{BoneTarget, ControlContext, ControllerId, ControllerTable, FrameContext},
    pose::{fill_with_reference_pose, normalize_rotation, ComponentPose, LocalPose, Trs},
    required_bones::RequiredBones,
    skeleton::Skeleton,
};

/// Parent matrices with a determinant this small are not inverted.
const MIN_DETERMINANT: f32 = 1e-8;

/// Component-space pose from a physics simulation, blended in after composition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsOverride {
    pub weight: f32,
    /// (bone, component-space transform)
    pub bones: Vec<(usize, Mat4)>,
}

pub struct ComposeInput<'a> {
    pub skeleton: &'a Skeleton,
    pub required: &'a RequiredBones,
    pub frame: &'a FrameContext,
    pub config: &'a ControllerConfig,
    pub physics: Option<&'a PhysicsOverride>,
}

/// Scratch buffers reused across frames.
#[derive(Default)]
pub struct Composer {
    chain: Vec<ControllerId>,
    affected: Vec<usize>,
    targets: Vec<BoneTarget>,
    priority: Vec<bool>,
    physics_targets: Vec<Option<Mat4>>,
}

/// One-shot composition with fresh scratch buffers.
pub fn compose(
    input: &ComposeInput,
    local: &mut LocalPose,
    controllers: Option<&mut ControllerTable>,
    component: &mut ComponentPose,
) {
    Composer::default().compose(input, local, controllers, component);
}

fn compose_bone(skeleton: &Skeleton, local: &[Trs], component: &mut [Mat4], bone: usize) {
    let matrix = local[bone].to_matrix();
    component[bone] = match skeleton.parent(bone) {
        Some(parent) => component[parent] * matrix,
        None => matrix,
    };
}

fn parent_matrix(skeleton: &Skeleton, component: &[Mat4], bone: usize) -> Mat4 {
    skeleton.parent(bone).map_or(Mat4::IDENTITY, |parent| component[parent])
}

/// Blends `local[bone]` toward the local transform that puts the bone at
/// `target` under its current parent.
fn blend_toward(
    skeleton: &Skeleton,
    local: &mut [Trs],
    component: &mut [Mat4],
    bone: usize,
    target: &BoneTarget,
    strength: f32,
    hard: bool,
) {
    let parent = parent_matrix(skeleton, component, bone);
    if let Some(transform) = target.transform {
        if parent.determinant().abs() <= MIN_DETERMINANT {
            log::debug!("bone {bone}: degenerate parent matrix, controller target skipped");
        } else {
            let local_target = Trs::from_matrix(&(parent.inverse() * transform));
            local[bone] = if hard { local_target } else { local[bone].blend(&local_target, strength) };
        }
    }
    if let Some(scale) = target.scale {
        let scale = if hard { scale } else { 1.0 + (scale - 1.0) * strength };
        local[bone].s *= scale;
    }
    component[bone] = parent * local[bone].to_matrix();
}

/// Required bones strictly after `bone` up to and including `last`.
fn required_after<'r>(required: &'r RequiredBones, bone: usize, last: usize) -> &'r [usize] {
    let bones = required.bones();
    let start = bones.partition_point(|&b| b <= bone);
    let end = bones.partition_point(|&b| b <= last);
    &bones[start..end.max(start)]
}

impl Composer {
    pub fn compose(
        &mut self,
        input: &ComposeInput,
        local: &mut LocalPose,
        controllers: Option<&mut ControllerTable>,
        component: &mut ComponentPose,
    ) {
        let skeleton = input.skeleton;
        let count = skeleton.bone_count();
        if local.len() != count {
            log::warn!("local pose has {} bones, skeleton has {count}; using the reference pose", local.len());
            fill_with_reference_pose(local, skeleton, &[]);
        }
        component.resize(count, Mat4::IDENTITY);

        for &bone in input.required.bones() {
            local[bone].r = normalize_rotation(local[bone].r);
        }

        match controllers {
            Some(table) if !table.is_empty() => {
                table.tick(input.frame);
                if self.mark_priority(skeleton, table) {
                    self.run_pass(input, local, table, component, Some(true));
                    self.run_pass(input, local, table, component, Some(false));
                } else {
                    self.run_pass(input, local, table, component, None);
                }
            }
            _ => {
                for &bone in input.required.bones() {
                    debug_assert!(skeleton.parent(bone).map_or(true, |p| input.required.contains(p)));
                    compose_bone(skeleton, local, component, bone);
                }
            }
        }

        if let Some(physics) = input.physics {
            self.apply_physics(input, local, physics, component);
        }

        fill_non_required(skeleton, input.required, component);
    }

    /// Marks every priority root with its descendants and its ancestors.
    fn mark_priority(&mut self, skeleton: &Skeleton, table: &ControllerTable) -> bool {
        let count = skeleton.bone_count();
        self.priority.clear();
        self.priority.resize(count, false);

        let mut any = false;
        for root in table.priority_roots() {
            if root < count {
                self.priority[root] = true;
                any = true;
            }
        }
        if !any {
            return false;
        }

        for bone in 1..count {
            if let Some(parent) = skeleton.parent(bone) {
                if self.priority[parent] {
                    self.priority[bone] = true;
                }
            }
        }
        for root in table.priority_roots().filter(|&root| root < count) {
            let mut current = skeleton.parent(root);
            while let Some(idx) = current {
                self.priority[idx] = true;
                current = skeleton.parent(idx);
            }
        }
        true
    }

    fn run_pass(
        &mut self,
        input: &ComposeInput,
        local: &mut LocalPose,
        table: &mut ControllerTable,
        component: &mut ComponentPose,
        priority: Option<bool>,
    ) {
        let skeleton = input.skeleton;
        for &bone in input.required.bones() {
            if priority.is_some_and(|wanted| self.priority[bone] != wanted) {
                continue;
            }
            debug_assert!(skeleton.parent(bone).map_or(true, |p| input.required.contains(p)));
            compose_bone(skeleton, local, component, bone);

            if !table.has_chain(bone) {
                continue;
            }
            self.chain.clear();
            self.chain.extend(table.chain(bone));
            for idx in 0..self.chain.len() {
                let id = self.chain[idx];
                self.apply_controller(input, local, table, component, bone, id);
            }
        }
    }

    fn apply_controller(
        &mut self,
        input: &ComposeInput,
        local: &mut LocalPose,
        table: &mut ControllerTable,
        component: &mut ComponentPose,
        bone: usize,
        id: ControllerId,
    ) {
        let skeleton = input.skeleton;
        let threshold = input.config.zero_weight_threshold;
        let Some(node) = table.node_mut(id) else { return };

        let strength = node.effective_strength();
        if strength <= threshold || input.frame.lod > node.max_lod {
            return;
        }
        if input.config.ignore_when_not_rendered && node.ignore_when_not_rendered && !input.frame.recently_rendered {
            return;
        }

        self.affected.clear();
        node.controller.affected_bones(skeleton, bone, &mut self.affected);
        self.affected.sort_unstable();
        self.affected.dedup();
        let declared = self.affected.len();
        self.affected
            .retain(|&b| b < skeleton.bone_count() && (b == bone || skeleton.is_ancestor(bone, b)));
        if self.affected.len() != declared {
            log::warn!(
                "controller {id} on bone {bone} claims {} bones outside its hierarchy, ignoring them",
                declared - self.affected.len()
            );
        }
        self.affected.retain(|&b| input.required.contains(b));
        let Some(&last) = self.affected.last() else { return };

        // descendants up to the last affected bone are read by compute_targets
        for &b in required_after(input.required, bone, last) {
            if skeleton.is_ancestor(bone, b) {
                compose_bone(skeleton, local, component, b);
            }
        }

        self.targets.clear();
        let cx = ControlContext {
            skeleton,
            bone,
            local: local.as_slice(),
            component: component.as_slice(),
            frame: input.frame,
        };
        node.controller.compute_targets(&cx, &self.affected, &mut self.targets);
        if self.targets.is_empty() {
            log::debug!("controller {id} on bone {bone} has nothing to do for bones {:?}", self.affected);
            return;
        }
        if self.targets.len() != self.affected.len() {
            log::warn!(
                "controller {id} on bone {bone} returned {} targets for {} bones",
                self.targets.len(),
                self.affected.len()
            );
            return;
        }

        let hard = strength >= 1.0 - threshold;
        let mut next = 0;
        if self.affected[0] == bone {
            blend_toward(skeleton, local, component, bone, &self.targets[0], strength, hard);
            next = 1;
        }
        // affected bones get their targets, the gaps in between are recomposed
        for &b in required_after(input.required, bone, last) {
            if !skeleton.is_ancestor(bone, b) {
                continue;
            }
            if self.affected.get(next) == Some(&b) {
                blend_toward(skeleton, local, component, b, &self.targets[next], strength, hard);
                next += 1;
            } else {
                compose_bone(skeleton, local, component, b);
            }
        }
    }

    fn apply_physics(&mut self, input: &ComposeInput, local: &mut LocalPose, physics: &PhysicsOverride, component: &mut ComponentPose) {
        let skeleton = input.skeleton;
        let threshold = input.config.zero_weight_threshold;
        let weight = physics.weight.clamp(0.0, 1.0);
        if weight <= threshold || physics.bones.is_empty() {
            return;
        }

        self.physics_targets.clear();
        self.physics_targets.resize(skeleton.bone_count(), None);
        let mut first = usize::MAX;
        for &(bone, transform) in &physics.bones {
            if !input.required.contains(bone) {
                log::debug!("physics override for bone {bone} ignored, bone not required");
                continue;
            }
            self.physics_targets[bone] = Some(transform);
            first = first.min(bone);
        }
        if first == usize::MAX {
            return;
        }

        let hard = weight >= 1.0 - threshold;
        let bones = input.required.bones();
        for &bone in &bones[bones.partition_point(|&b| b < first)..] {
            match self.physics_targets[bone] {
                Some(transform) => {
                    blend_toward(skeleton, local, component, bone, &BoneTarget::transform(transform), weight, hard)
                }
                None => compose_bone(skeleton, local, component, bone),
            }
        }
    }
}

/// Bones outside the required set follow their nearest required ancestor rigidly.
///
/// Composing the reference local transform under the parent gives
/// `RefToCurrent[ancestor] * ReferenceComponent[bone]`, so the bone shares
/// its ancestor's reference-to-current matrix.
fn fill_non_required(skeleton: &Skeleton, required: &RequiredBones, component: &mut [Mat4]) {
    if required.len() == skeleton.bone_count() {
        return;
    }
    for bone in 0..skeleton.bone_count() {
        if required.contains(bone) {
            continue;
        }
        component[bone] = parent_matrix(skeleton, component, bone) * skeleton.bone(bone).reference.to_matrix();
    }
}

/// `ComponentPose[i] * ReferenceInverse[i]`: maps reference-pose vertices to the current pose.
pub fn reference_to_current(skeleton: &Skeleton, component: &[Mat4], out: &mut Vec<Mat4>) {
    out.clear();
    out.extend(component.iter().zip(skeleton.reference_inverse()).map(|(current, inverse)| *current * *inverse));
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::f32::consts::FRAC_PI_2;

    use glam::{Quat, Vec3};

    use super::*;
    use crate::game::{
        controllers::{
            BoneController, BoneControlMode, BoneScaleControl, ControlStrength, ControllerNode, LimbControl, LookAtControl,
            SingleBoneControl,
        },
        required_bones::select_required_bones,
        skeleton::tests::test_skeleton,
    };

    fn reference_local(skeleton: &Skeleton) -> LocalPose {
        skeleton.bones().iter().map(|b| b.reference).collect()
    }

    fn run(skeleton: &Skeleton, lod: usize, local: &mut LocalPose, table: Option<&mut ControllerTable>, physics: Option<&PhysicsOverride>) -> ComponentPose {
        let frame = FrameContext { generation: 1, dt: 1.0 / 60.0, lod, recently_rendered: true };
        run_frame(skeleton, &frame, &ControllerConfig::default(), local, table, physics)
    }

    fn run_frame(
        skeleton: &Skeleton,
        frame: &FrameContext,
        config: &ControllerConfig,
        local: &mut LocalPose,
        table: Option<&mut ControllerTable>,
        physics: Option<&PhysicsOverride>,
    ) -> ComponentPose {
        let required = select_required_bones(skeleton, frame.lod, &[]);
        let input = ComposeInput { skeleton, required: &required, frame, config, physics };
        let mut component = ComponentPose::new();
        compose(&input, local, table, &mut component);
        component
    }

    fn position(m: &Mat4) -> Vec3 {
        m.w_axis.truncate()
    }

    /// Test controller driven by a plain function.
    struct Scripted {
        bones: Vec<usize>,
        target: fn(&ControlContext, usize) -> BoneTarget,
    }

    impl BoneController for Scripted {
        fn affected_bones(&self, _skeleton: &Skeleton, _bone: usize, out: &mut Vec<usize>) {
            out.extend_from_slice(&self.bones);
        }

        fn compute_targets(&mut self, cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>) {
            out.extend(affected.iter().map(|&b| (self.target)(cx, b)));
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn reference_local_pose_composes_to_reference_component() {
        let skel = test_skeleton();
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, None, None);
        for (composed, reference) in component.iter().zip(skel.reference_component()) {
            assert!(composed.abs_diff_eq(*reference, 1e-5));
        }
    }

    #[test]
    fn reference_to_current_is_identity_in_reference_pose() {
        let skel = test_skeleton();
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, None, None);
        let mut ref_to_current = Vec::new();
        reference_to_current(&skel, &component, &mut ref_to_current);

        let vertex = Vec3::new(1.4, 1.9, 0.1);
        for (idx, m) in ref_to_current.iter().enumerate() {
            assert!(m.transform_point3(vertex).abs_diff_eq(vertex, 1e-5), "bone {idx}");
            let local_vertex = skel.reference_inverse()[idx].transform_point3(vertex);
            assert!(component[idx].transform_point3(local_vertex).abs_diff_eq(vertex, 1e-5));
        }
    }

    #[test]
    fn mismatched_local_pose_falls_back_to_reference() {
        let skel = test_skeleton();
        let mut local = LocalPose::new();
        let component = run(&skel, 0, &mut local, None, None);
        assert_eq!(local.len(), skel.bone_count());
        assert!(component[5].abs_diff_eq(skel.reference_component()[5], 1e-5));
    }

    #[test]
    fn non_required_bones_follow_their_ancestor() {
        let skel = test_skeleton();
        let mut local = reference_local(&skel);
        local[1].r = Quat::from_rotation_z(FRAC_PI_2);
        // not required at LOD 1, must be ignored
        local[5].t = Vec3::splat(100.0);
        let component = run(&skel, 1, &mut local, None, None);

        let mut ref_to_current = Vec::new();
        reference_to_current(&skel, &component, &mut ref_to_current);
        assert!(ref_to_current[5].abs_diff_eq(ref_to_current[4], 1e-5));
        assert!(ref_to_current[3].abs_diff_eq(ref_to_current[2], 1e-5));
        // head sits 0.5 above the neck along the rotated spine
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(-1.5, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn hard_replace_moves_descendants() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(2, ControllerNode::new(Box::new(SingleBoneControl::translation(Vec3::new(3.0, 0.0, 0.0), BoneControlMode::Replace))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-5));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(3.0, 0.5, 0.0), 1e-5));
        // siblings are untouched
        assert!(position(&component[5]).abs_diff_eq(Vec3::new(1.5, 1.8, 0.0), 1e-5));
    }

    #[test]
    fn half_strength_blends_half_way() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        let control = SingleBoneControl::rotation(Quat::from_rotation_z(FRAC_PI_2), BoneControlMode::Additive);
        table.add(1, ControllerNode::new(Box::new(control)).with_strength(ControlStrength::new(0.5)));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        let (_, rotation, _) = component[1].to_scale_rotation_translation();
        let expected = Quat::from_rotation_z(FRAC_PI_2 * 0.5);
        assert!(rotation.abs_diff_eq(expected, 1e-5) || rotation.abs_diff_eq(-expected, 1e-5));
    }

    #[test]
    fn weak_and_out_of_lod_controllers_are_skipped() {
        let skel = test_skeleton();
        let control = || Box::new(SingleBoneControl::translation(Vec3::X, BoneControlMode::Additive));

        let mut table = ControllerTable::new(skel.bone_count());
        table.add(1, ControllerNode::new(control()).with_strength(ControlStrength::new(0.0)));
        table.add(1, ControllerNode::new(control()).with_max_lod(0));
        let mut local = reference_local(&skel);
        let component = run(&skel, 1, &mut local, Some(&mut table), None);
        assert!(component[1].abs_diff_eq(skel.reference_component()[1], 1e-5));
    }

    #[test]
    fn chain_applies_in_declared_order() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(2, ControllerNode::new(Box::new(SingleBoneControl::translation(Vec3::new(5.0, 0.0, 0.0), BoneControlMode::Replace))));
        table.add(2, ControllerNode::new(Box::new(SingleBoneControl::translation(Vec3::X, BoneControlMode::Additive))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn bones_outside_the_hierarchy_are_dropped() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(
            2,
            ControllerNode::new(Box::new(Scripted {
                bones: vec![0, 1, 2],
                target: |_, _| BoneTarget::transform(Mat4::from_translation(Vec3::new(7.0, 7.0, 7.0))),
            })),
        );
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(component[0].abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert!(position(&component[1]).abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(position(&component[2]).abs_diff_eq(Vec3::splat(7.0), 1e-5));
    }

    #[test]
    fn gaps_between_affected_bones_are_recomposed() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        // moves the spine but pins the head where it currently is
        table.add(
            1,
            ControllerNode::new(Box::new(Scripted {
                bones: vec![1, 3],
                target: |cx, bone| match bone {
                    1 => BoneTarget::transform(Mat4::from_translation(Vec3::X) * cx.component[1]),
                    _ => BoneTarget::transform(cx.component[bone]),
                },
            })),
        );
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(position(&component[1]).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(0.0, 2.5, 0.0), 1e-5));
        assert!(position(&component[5]).abs_diff_eq(Vec3::new(2.5, 1.8, 0.0), 1e-5));
    }

    #[test]
    fn bone_scale_reaches_children() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(2, ControllerNode::new(Box::new(BoneScaleControl::new(2.0))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-5));
    }

    #[test]
    fn limb_reaches_target() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        let effector = Vec3::new(0.6, 1.8, 0.0);
        table.add(1, ControllerNode::new(Box::new(LimbControl::new(2, 3, effector, Vec3::new(1.0, 1.5, 0.0)))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);

        assert!(position(&component[3]).abs_diff_eq(effector, 1e-4));
        let upper = (position(&component[2]) - position(&component[1])).length();
        let lower = (position(&component[3]) - position(&component[2])).length();
        assert!((upper - 1.0).abs() < 1e-4);
        assert!((lower - 0.5).abs() < 1e-4);
        // bends toward the joint target
        assert!(position(&component[2]).x > 0.0);
    }

    #[test]
    fn limb_clamps_unreachable_target() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(1, ControllerNode::new(Box::new(LimbControl::new(2, 3, Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, 1.5, 0.0)))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(0.0, 2.5, 0.0), 1e-4));
    }

    #[test]
    fn broken_limb_chain_is_a_no_op() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        // hand is not a child of the neck
        table.add(1, ControllerNode::new(Box::new(LimbControl::new(2, 5, Vec3::ZERO, Vec3::X))));
        table.add(0, ControllerNode::new(Box::new(LimbControl::new(1, 2, Vec3::ZERO, Vec3::X))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        for (composed, reference) in component.iter().zip(skel.reference_component()) {
            assert!(composed.abs_diff_eq(*reference, 1e-5));
        }
    }

    #[test]
    fn limb_without_its_end_bone_leaves_the_pose_alone() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        // the head is not required at LOD 1
        table.add(1, ControllerNode::new(Box::new(LimbControl::new(2, 3, Vec3::new(0.6, 1.8, 0.0), Vec3::X))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 1, &mut local, Some(&mut table), None);
        for bone in [1, 2] {
            assert!(component[bone].abs_diff_eq(skel.reference_component()[bone], 1e-5));
        }
    }

    #[test]
    fn limb_can_keep_the_animated_end_rotation() {
        let skel = test_skeleton();
        let effector = Vec3::new(0.6, 1.8, 0.0);
        let mut limb = LimbControl::new(2, 3, effector, Vec3::new(1.0, 1.5, 0.0));
        limb.keep_end_rotation = true;
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(1, ControllerNode::new(Box::new(limb)));
        let mut local = reference_local(&skel);
        local[3].r = Quat::from_rotation_z(0.4);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);

        assert!(position(&component[3]).abs_diff_eq(effector, 1e-4));
        let (_, rotation, _) = component[3].to_scale_rotation_translation();
        let expected = Quat::from_rotation_z(0.4);
        assert!(rotation.abs_diff_eq(expected, 1e-4) || rotation.abs_diff_eq(-expected, 1e-4));
    }

    #[test]
    fn look_at_aims_the_axis_at_the_target() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(2, ControllerNode::new(Box::new(LookAtControl::new(Vec3::new(3.0, 2.0, 0.0), Vec3::Y))));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert!(component[2].transform_vector3(Vec3::Y).abs_diff_eq(Vec3::X, 1e-5));
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(0.5, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn look_at_turns_at_most_max_angle() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        let look = LookAtControl::new(Vec3::new(3.0, 2.0, 0.0), Vec3::Y).with_max_angle(0.3);
        table.add(2, ControllerNode::new(Box::new(look)));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        let aim = component[2].transform_vector3(Vec3::Y);
        assert!(aim.abs_diff_eq(Vec3::new(0.3f32.sin(), 0.3f32.cos(), 0.0), 1e-5));
    }

    #[test]
    fn unrendered_owner_skips_flagged_controllers() {
        let skel = test_skeleton();
        let config = ControllerConfig { ignore_when_not_rendered: true, ..Default::default() };
        let moved = |config: &ControllerConfig, recently_rendered: bool| {
            let mut table = ControllerTable::new(skel.bone_count());
            let control = SingleBoneControl::translation(Vec3::new(3.0, 0.0, 0.0), BoneControlMode::Replace);
            table.add(2, ControllerNode::new(Box::new(control)).with_ignore_when_not_rendered(true));
            let frame = FrameContext { generation: 1, dt: 0.1, lod: 0, recently_rendered };
            let mut local = reference_local(&skel);
            let component = run_frame(&skel, &frame, config, &mut local, Some(&mut table), None);
            position(&component[2]).abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-5)
        };
        assert!(!moved(&config, false));
        assert!(moved(&config, true));
        assert!(moved(&ControllerConfig::default(), false));
    }

    #[test]
    fn degenerate_parent_keeps_the_animated_local() {
        let skel = test_skeleton();
        let mut table = ControllerTable::new(skel.bone_count());
        table.add(2, ControllerNode::new(Box::new(SingleBoneControl::translation(Vec3::new(3.0, 0.0, 0.0), BoneControlMode::Replace))));
        let mut local = reference_local(&skel);
        local[1].s = Vec3::ZERO;
        let component = run(&skel, 0, &mut local, Some(&mut table), None);
        assert_eq!(local[2], skel.bone(2).reference);
        assert!(component[2].is_finite());
    }

    #[test]
    fn priority_branch_is_resolved_first() {
        let skel = test_skeleton();
        let follow_hand = || Scripted {
            bones: vec![2],
            target: |cx, bone| BoneTarget::transform(Mat4::from_translation(cx.component_position(5)) * Mat4::from_quat(Quat::from_mat4(&cx.component[bone]))),
        };

        let mut single_pass = ControllerTable::new(skel.bone_count());
        single_pass.add(2, ControllerNode::new(Box::new(follow_hand())));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut single_pass), None);
        // the hand has not been composed yet when the neck is
        assert!(position(&component[2]).abs_diff_eq(Vec3::ZERO, 1e-5));

        let mut two_pass = ControllerTable::new(skel.bone_count());
        two_pass.add(2, ControllerNode::new(Box::new(follow_hand())));
        two_pass.add(4, ControllerNode::new(Box::new(SingleBoneControl::default())).with_priority(true));
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, Some(&mut two_pass), None);
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(1.5, 1.8, 0.0), 1e-4));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(1.5, 2.3, 0.0), 1e-4));
    }

    #[test]
    fn physics_override_blends_and_propagates() {
        let skel = test_skeleton();
        let physics = PhysicsOverride { weight: 1.0, bones: vec![(2, Mat4::from_translation(Vec3::new(2.0, 2.0, 0.0)))] };
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, None, Some(&physics));
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(2.0, 2.0, 0.0), 1e-5));
        assert!(position(&component[3]).abs_diff_eq(Vec3::new(2.0, 2.5, 0.0), 1e-5));

        let half = PhysicsOverride { weight: 0.5, ..physics };
        let mut local = reference_local(&skel);
        let component = run(&skel, 0, &mut local, None, Some(&half));
        assert!(position(&component[2]).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }
}
