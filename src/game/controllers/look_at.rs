use std::any::Any;

use glam::{Mat4, Quat, Vec3};

use crate::game::skeleton::Skeleton;

use super::{BoneController, BoneTarget, ControlContext};

/// Turns a bone so one of its local axes points at a component-space target.
#[derive(Clone, Debug)]
pub struct LookAtControl {
    pub target: Vec3,
    /// bone-local axis that should point at `target`
    pub aim_axis: Vec3,
    /// radians, None for unlimited
    pub max_angle: Option<f32>,
}

impl LookAtControl {
    pub fn new(target: Vec3, aim_axis: Vec3) -> Self {
        Self { target, aim_axis, max_angle: None }
    }

    pub fn with_max_angle(mut self, max_angle: f32) -> Self {
        self.max_angle = Some(max_angle);
        self
    }

    fn aim_rotation(&self, current: &Mat4) -> Quat {
        let position = current.w_axis.truncate();
        let Some(from) = current.transform_vector3(self.aim_axis).try_normalize() else {
            return Quat::IDENTITY;
        };
        let Some(to) = (self.target - position).try_normalize() else {
            return Quat::IDENTITY;
        };
        let angle = from.angle_between(to);
        match self.max_angle {
            Some(max_angle) if angle > max_angle => match from.cross(to).try_normalize() {
                Some(axis) => Quat::from_axis_angle(axis, max_angle),
                None => Quat::IDENTITY,
            },
            _ => Quat::from_rotation_arc(from, to),
        }
    }
}

impl BoneController for LookAtControl {
    fn affected_bones(&self, _skeleton: &Skeleton, bone: usize, out: &mut Vec<usize>) {
        out.push(bone);
    }

    fn compute_targets(&mut self, cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>) {
        for &bone in affected {
            let current = cx.component[bone];
            let pivot = current.w_axis.truncate();
            let rotation = self.aim_rotation(&current);
            let target = Mat4::from_translation(pivot) * Mat4::from_quat(rotation) * Mat4::from_translation(-pivot) * current;
            out.push(BoneTarget::transform(target));
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
