use std::any::Any;

use glam::{Mat4, Quat, Vec3};

use crate::game::{pose::normalize_rotation, skeleton::Skeleton};

use super::{BoneController, BoneTarget, ControlContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoneControlMode {
    /// applied on top of the animated component-space value
    #[default]
    Additive,
    /// overwrites the animated component-space value
    Replace,
}

/// Adds to or replaces the component-space rotation and/or translation of one bone.
#[derive(Clone, Debug, Default)]
pub struct SingleBoneControl {
    pub rotation: Option<Quat>,
    pub rotation_mode: BoneControlMode,
    pub translation: Option<Vec3>,
    pub translation_mode: BoneControlMode,
}

impl SingleBoneControl {
    pub fn rotation(rotation: Quat, mode: BoneControlMode) -> Self {
        Self { rotation: Some(rotation), rotation_mode: mode, ..Default::default() }
    }

    pub fn translation(translation: Vec3, mode: BoneControlMode) -> Self {
        Self { translation: Some(translation), translation_mode: mode, ..Default::default() }
    }
}

impl BoneController for SingleBoneControl {
    fn affected_bones(&self, _skeleton: &Skeleton, bone: usize, out: &mut Vec<usize>) {
        out.push(bone);
    }

    fn compute_targets(&mut self, cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>) {
        for &bone in affected {
            let (scale, mut rotation, mut translation) = cx.component[bone].to_scale_rotation_translation();
            if let Some(r) = self.rotation {
                rotation = match self.rotation_mode {
                    BoneControlMode::Additive => normalize_rotation(r) * rotation,
                    BoneControlMode::Replace => normalize_rotation(r),
                };
            }
            if let Some(t) = self.translation {
                translation = match self.translation_mode {
                    BoneControlMode::Additive => translation + t,
                    BoneControlMode::Replace => t,
                };
            }
            out.push(BoneTarget::transform(Mat4::from_scale_rotation_translation(scale, rotation, translation)));
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
