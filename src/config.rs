use std::{fs::File, io::BufReader, path::Path};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{game::root_motion::{RootMotionMode, RootMotionRotationMode}, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MorphConfig {
    /// Morphs weighted below this are skipped entirely.
    pub min_weight: f32,
    /// Morphs weighted above this are treated as bad data and skipped.
    pub max_weight: f32,
}
impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.01,
            max_weight: 5.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub zero_weight_threshold: f32,
    pub ignore_when_not_rendered: bool,
}
impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            zero_weight_threshold: 0.00001,
            ignore_when_not_rendered: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RootMotionConfig {
    pub translation_mode: RootMotionMode,
    pub rotation_mode: RootMotionRotationMode,
    /// per-axis scale applied to the world space translation delta
    pub accel_scale: Vec3,
    /// keep the root bone at its reference pose while the owner consumes root motion
    pub lock_root_in_pose: bool,
}
impl Default for RootMotionConfig {
    fn default() -> Self {
        Self {
            translation_mode: RootMotionMode::Ignore,
            rotation_mode: RootMotionRotationMode::Ignore,
            accel_scale: Vec3::ONE,
            lock_root_in_pose: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SkinningConfig {
    /// skin chunks of one mesh in parallel with rayon
    pub parallel: bool,
    pub worker_threads: usize,
    pub recycled_buffers: usize,
}
impl Default for SkinningConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: 1,
            recycled_buffers: 8,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub tick_hz: u32,
}
impl Default for SimConfig {
    fn default() -> Self {
        Self { tick_hz: 60 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RigConfig {
    pub morph: MorphConfig,
    pub controllers: ControllerConfig,
    pub root_motion: RootMotionConfig,
    pub skinning: SkinningConfig,
    pub sim: SimConfig,
}

impl RigConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
