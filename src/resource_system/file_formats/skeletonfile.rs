use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Joint {
    pub name: String,
    /// None for the root, otherwise an index smaller than this joint's own
    pub parent: Option<u32>,
    pub translation: [f32; 3],
    /// xyzw
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    /// lods[lod_idx] => strictly increasing, parent-closed joint indices.
    /// An empty list means "every joint".
    #[serde(default)]
    pub lods: Vec<Vec<u32>>,
}

pub fn load(path: impl AsRef<Path>) -> Result<Skeleton> {
    super::read_json(path)
}
