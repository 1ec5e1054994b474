use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::RootMotionConfig;

use super::pose::{normalize_rotation, Trs};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RootMotionMode {
    /// root translation stays in the pose, nothing is extracted
    #[default]
    Ignore,
    /// extracted motion accumulates until the owner consumes it
    Accumulate,
    /// the owner moves by the extracted motion in the same frame
    ImmediateApply,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RootMotionRotationMode {
    #[default]
    Ignore,
    ApplyToOwner,
}

/// World-space translation and rotation the owner should inherit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootMotionDelta {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for RootMotionDelta {
    fn default() -> Self {
        Self::ZERO
    }
}

impl RootMotionDelta {
    pub const ZERO: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn is_zero(&self) -> bool {
        self.translation == Vec3::ZERO && self.rotation == Quat::IDENTITY
    }

    /// `other` happened after `self`.
    pub fn then(&self, other: &RootMotionDelta) -> RootMotionDelta {
        RootMotionDelta {
            translation: self.translation + other.translation,
            rotation: normalize_rotation(other.rotation * self.rotation),
        }
    }
}

/// The animated change of the root bone since the previous frame, with the
/// translation rotated into world space by the owner's orientation.
///
/// The owner's scale is not applied, only the per-axis `accel_scale`.
pub fn extract_root_motion(current: &Trs, previous: &Trs, world: &Mat4, accel_scale: Vec3) -> RootMotionDelta {
    let (_, owner_rotation, _) = world.to_scale_rotation_translation();
    let owner_rotation = normalize_rotation(owner_rotation);
    let translation = owner_rotation * (current.t - previous.t) * accel_scale;
    let mesh_rotation = normalize_rotation(normalize_rotation(current.r) * normalize_rotation(previous.r).inverse());
    let rotation = normalize_rotation(owner_rotation * mesh_rotation * owner_rotation.inverse());
    RootMotionDelta { translation, rotation }
}

/// Mode switch reported in the frame it takes effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootMotionModeChange {
    pub translation: RootMotionMode,
    pub rotation: RootMotionRotationMode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RootMotionFrame {
    /// motion extracted this frame, before any mode filtering
    pub extracted: RootMotionDelta,
    /// motion the owner must apply right now (ImmediateApply with movement authority)
    pub applied: RootMotionDelta,
    /// world-space root velocity
    pub velocity: Vec3,
    pub mode_change: Option<RootMotionModeChange>,
}

#[derive(Clone, Copy, Debug)]
struct PendingModes {
    modes: RootMotionModeChange,
    deferred: bool,
}

/// Tracks the root bone between frames and routes its motion to the owner.
#[derive(Clone, Debug)]
pub struct RootMotionExtractor {
    translation_mode: RootMotionMode,
    rotation_mode: RootMotionRotationMode,
    accel_scale: Vec3,
    lock_root_in_pose: bool,
    pending: Option<PendingModes>,
    /// set when ImmediateApply was switched to Ignore, the next update still
    /// hands its translation to the owner
    forward_once: bool,
    /// the current frame's translation went to the owner through `forward_once`
    forwarding: bool,
    previous: Option<Trs>,
    accumulated: RootMotionDelta,
    velocity: Vec3,
}

impl RootMotionExtractor {
    pub fn new(config: &RootMotionConfig) -> Self {
        Self {
            translation_mode: config.translation_mode,
            rotation_mode: config.rotation_mode,
            accel_scale: config.accel_scale,
            lock_root_in_pose: config.lock_root_in_pose,
            pending: None,
            forward_once: false,
            forwarding: false,
            previous: None,
            accumulated: RootMotionDelta::ZERO,
            velocity: Vec3::ZERO,
        }
    }

    pub fn translation_mode(&self) -> RootMotionMode {
        self.translation_mode
    }

    pub fn rotation_mode(&self) -> RootMotionRotationMode {
        self.rotation_mode
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Requests new modes. The switch lands at the end of the next update,
    /// or one update later if that update extracted motion.
    pub fn set_modes(&mut self, translation: RootMotionMode, rotation: RootMotionRotationMode) {
        if translation == self.translation_mode && rotation == self.rotation_mode {
            self.pending = None;
            return;
        }
        self.pending = Some(PendingModes {
            modes: RootMotionModeChange { translation, rotation },
            deferred: false,
        });
    }

    /// Forgets the previous root so the next update extracts nothing.
    pub fn reset(&mut self) {
        self.previous = None;
        self.forward_once = false;
        self.forwarding = false;
        self.velocity = Vec3::ZERO;
    }

    /// Extracts this frame's root motion. Without movement authority the
    /// motion is accumulated instead of applied.
    pub fn update(&mut self, root: &Trs, world: &Mat4, dt: f32, has_movement_authority: bool) -> RootMotionFrame {
        let extracted = match &self.previous {
            Some(previous) => extract_root_motion(root, previous, world, self.accel_scale),
            None => RootMotionDelta::ZERO,
        };
        self.previous = Some(*root);

        self.forwarding = std::mem::take(&mut self.forward_once);
        let translation = match self.translation_mode {
            RootMotionMode::Ignore if !self.forwarding => Vec3::ZERO,
            _ => extracted.translation,
        };
        let rotation = match self.rotation_mode {
            RootMotionRotationMode::Ignore => Quat::IDENTITY,
            RootMotionRotationMode::ApplyToOwner => extracted.rotation,
        };
        let delta = RootMotionDelta { translation, rotation };

        let mut applied = RootMotionDelta::ZERO;
        let immediate = self.translation_mode == RootMotionMode::ImmediateApply || self.forwarding;
        if immediate && has_movement_authority {
            applied = delta;
        } else if !delta.is_zero() {
            self.accumulated = self.accumulated.then(&delta);
        }

        self.velocity = if dt > 0.0 { delta.translation / dt } else { Vec3::ZERO };

        let mode_change = self.advance_pending(!delta.is_zero());
        RootMotionFrame { extracted, applied, velocity: self.velocity, mode_change }
    }

    fn advance_pending(&mut self, moved: bool) -> Option<RootMotionModeChange> {
        let pending = self.pending.as_mut()?;
        if moved && !pending.deferred {
            pending.deferred = true;
            return None;
        }
        let modes = pending.modes;
        self.pending = None;
        self.forward_once =
            self.translation_mode == RootMotionMode::ImmediateApply && modes.translation == RootMotionMode::Ignore;
        self.translation_mode = modes.translation;
        self.rotation_mode = modes.rotation;
        Some(modes)
    }

    /// Returns everything accumulated since the last call and clears it.
    pub fn consume(&mut self) -> RootMotionDelta {
        std::mem::take(&mut self.accumulated)
    }

    /// Pins the root at its reference transform for the parts of the motion
    /// the owner is inheriting, so the mesh does not move twice.
    pub fn lock_root(&self, root: &mut Trs, reference: &Trs) {
        if !self.lock_root_in_pose {
            return;
        }
        if self.translation_mode != RootMotionMode::Ignore || self.forwarding {
            root.t = reference.t;
        }
        if self.rotation_mode != RootMotionRotationMode::Ignore {
            root.r = reference.r;
        }
    }
}
