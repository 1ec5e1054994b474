use glam::{Mat4, Quat, Vec3};

use super::skeleton::Skeleton;

/// Bone-local transform: translation, rotation and non-uniform scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trs {
    pub t: Vec3,
    pub r: Quat,
    pub s: Vec3,
}

impl Default for Trs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Trs {
    pub const IDENTITY: Self = Self {
        t: Vec3::ZERO,
        r: Quat::IDENTITY,
        s: Vec3::ONE,
    };

    pub fn new(t: Vec3, r: Quat, s: Vec3) -> Self {
        Self { t, r, s }
    }

    pub fn from_translation(t: Vec3) -> Self {
        Self { t, ..Self::IDENTITY }
    }

    pub fn from_rotation_translation(r: Quat, t: Vec3) -> Self {
        Self { t, r, s: Vec3::ONE }
    }

    pub fn from_matrix(m: &Mat4) -> Self {
        let (s, r, t) = m.to_scale_rotation_translation();
        Self { t, r: normalize_rotation(r), s }
    }

    /// Rotation is renormalized, callers may hand in unnormalized quaternions.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.s, normalize_rotation(self.r), self.t)
    }

    /// alpha = 0 => self, alpha = 1 => other
    pub fn blend(&self, other: &Trs, alpha: f32) -> Trs {
        let from = normalize_rotation(self.r);
        let to = normalize_rotation(other.r);
        Trs {
            t: self.t.lerp(other.t, alpha),
            r: from.slerp(to, alpha).normalize(),
            s: self.s.lerp(other.s, alpha),
        }
    }
}

/// Normalizes `q`, falling back to identity for degenerate input.
pub fn normalize_rotation(q: Quat) -> Quat {
    let len_sq = q.length_squared();
    if !len_sq.is_finite() || len_sq < 1e-12 {
        Quat::IDENTITY
    } else {
        q * len_sq.sqrt().recip()
    }
}

/// One local transform per skeleton bone.
pub type LocalPose = Vec<Trs>;

/// One component-space matrix per skeleton bone.
pub type ComponentPose = Vec<Mat4>;

/// Resizes `pose` to the skeleton and writes the reference pose for `bones`.
pub fn fill_with_reference_pose(pose: &mut LocalPose, skeleton: &Skeleton, bones: &[usize]) {
    if pose.len() != skeleton.bone_count() {
        pose.clear();
        pose.extend(skeleton.bones().iter().map(|bone| bone.reference));
        return;
    }
    for &idx in bones {
        pose[idx] = skeleton.bone(idx).reference;
    }
}
