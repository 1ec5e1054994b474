use std::any::Any;

use crate::game::skeleton::Skeleton;

use super::{BoneController, BoneTarget, ControlContext};

/// Uniformly scales one bone, and through it the bone's children.
#[derive(Clone, Debug)]
pub struct BoneScaleControl {
    pub scale: f32,
}

impl BoneScaleControl {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl BoneController for BoneScaleControl {
    fn affected_bones(&self, _skeleton: &Skeleton, bone: usize, out: &mut Vec<usize>) {
        out.push(bone);
    }

    fn compute_targets(&mut self, _cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>) {
        out.extend(affected.iter().map(|_| BoneTarget::scale(self.scale)));
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
