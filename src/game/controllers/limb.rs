use std::any::Any;

use glam::{Mat4, Quat, Vec3};

use crate::game::skeleton::Skeleton;

use super::{BoneController, BoneTarget, ControlContext};

/// Analytic two-bone IK.
///
/// Attached to the upper bone of an upper -> lower -> end chain. Places the
/// end bone at `effector` (component space), bending the lower joint toward
/// `joint_target`.
#[derive(Clone, Debug)]
pub struct LimbControl {
    pub lower: usize,
    pub end: usize,
    pub effector: Vec3,
    pub joint_target: Vec3,
    /// keep the end bone's animated component-space rotation instead of
    /// letting it follow the lower bone
    pub keep_end_rotation: bool,
}

impl LimbControl {
    pub fn new(lower: usize, end: usize, effector: Vec3, joint_target: Vec3) -> Self {
        Self {
            lower,
            end,
            effector,
            joint_target,
            keep_end_rotation: false,
        }
    }
}

/// Rotates `m` by `rotation` about `from`, then moves that pivot to `to`.
fn pivot(m: &Mat4, from: Vec3, to: Vec3, rotation: Quat) -> Mat4 {
    Mat4::from_translation(to) * Mat4::from_quat(rotation) * Mat4::from_translation(-from) * *m
}

fn arc(from: Vec3, to: Vec3) -> Quat {
    match (from.try_normalize(), to.try_normalize()) {
        (Some(from), Some(to)) => Quat::from_rotation_arc(from, to),
        _ => Quat::IDENTITY,
    }
}

impl BoneController for LimbControl {
    fn affected_bones(&self, skeleton: &Skeleton, bone: usize, out: &mut Vec<usize>) {
        // the upper bone needs a parent to pivot under
        if bone == 0 || self.lower >= skeleton.bone_count() || self.end >= skeleton.bone_count() {
            return;
        }
        if skeleton.parent(self.lower) != Some(bone) || skeleton.parent(self.end) != Some(self.lower) {
            return;
        }
        out.extend([bone, self.lower, self.end]);
    }

    fn compute_targets(&mut self, cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>) {
        let &[upper, lower, end] = affected else {
            return;
        };
        let a = cx.component_position(upper);
        let b = cx.component_position(lower);
        let c = cx.component_position(end);
        let upper_len = (b - a).length();
        let lower_len = (c - b).length();

        let to_effector = self.effector - a;
        let Some(dir) = to_effector.try_normalize() else {
            out.extend(affected.iter().map(|&bone| BoneTarget::transform(cx.component[bone])));
            return;
        };
        let min_reach = (upper_len - lower_len).abs();
        let max_reach = upper_len + lower_len;
        let dist = to_effector.length().clamp(min_reach, max_reach);

        let reject = |v: Vec3| (v - dir * v.dot(dir)).try_normalize();
        let bend = reject(self.joint_target - a)
            .or_else(|| reject(b - a))
            .unwrap_or_else(|| dir.any_orthonormal_vector());

        let cos_upper = if upper_len * dist > f32::EPSILON {
            ((upper_len * upper_len + dist * dist - lower_len * lower_len) / (2.0 * upper_len * dist)).clamp(-1.0, 1.0)
        } else {
            1.0
        };
        let sin_upper = (1.0 - cos_upper * cos_upper).max(0.0).sqrt();
        let new_b = a + dir * (cos_upper * upper_len) + bend * (sin_upper * upper_len);
        let new_c = a + dir * dist;

        let upper_rotation = arc(b - a, new_b - a);
        let lower_rotation = arc(upper_rotation * (c - b), new_c - new_b) * upper_rotation;

        out.push(BoneTarget::transform(pivot(&cx.component[upper], a, a, upper_rotation)));
        out.push(BoneTarget::transform(pivot(&cx.component[lower], b, new_b, lower_rotation)));
        let end_target = if self.keep_end_rotation {
            Mat4::from_translation(new_c - c) * cx.component[end]
        } else {
            pivot(&cx.component[end], b, new_b, lower_rotation)
        };
        out.push(BoneTarget::transform(end_target));
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
