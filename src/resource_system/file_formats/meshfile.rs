use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tangent: [f32; 3],
    /// w carries the sign of the tangent basis determinant
    pub normal: [f32; 4],
    pub uv: [f32; 2],
    /// indexes into the owning chunk's bone_map
    #[serde(default)]
    pub bones: [u8; 4],
    /// ignored for rigid vertices
    #[serde(default)]
    pub weights: [f32; 4],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Chunk {
    /// chunk-local bone slot => skeleton bone index
    pub bone_map: Vec<u16>,
    pub max_bone_influences: u8,
    pub rigid_vertices: Vec<Vertex>,
    pub soft_vertices: Vec<Vertex>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Lod {
    pub chunks: Vec<Chunk>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MorphVertex {
    pub source_index: u32,
    pub position_delta: [f32; 3],
    pub normal_delta: [f32; 3],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Morph {
    pub name: String,
    /// lods[lod_idx] => sparse deltas sorted by source_index
    pub lods: Vec<Vec<MorphVertex>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkinnedMesh {
    /// path of the skeletonfile this mesh was bound against
    pub skeleton: String,
    pub bone_count: u32,
    pub lods: Vec<Lod>,
    #[serde(default)]
    pub morphs: Vec<Morph>,
}

pub fn load(path: impl AsRef<Path>) -> Result<SkinnedMesh> {
    super::read_json(path)
}
