use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::{resource_system::file_formats::meshfile, Result, RigError};

use super::{morph::MorphTarget, skeleton::Skeleton};

pub const MAX_INFLUENCES: usize = 4;

/// Immutable source vertex. Rigid vertices only read `influence_bones[0]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkinVertex {
    pub position: Vec3,
    pub tangent: Vec3,
    /// w = sign of the tangent basis determinant
    pub normal: Vec4,
    pub uv: Vec2,
    /// slots into the owning chunk's bone map
    pub influence_bones: [u8; MAX_INFLUENCES],
    /// pre-normalized at build time, never renormalized at runtime
    pub influence_weights: [f32; MAX_INFLUENCES],
}

impl SkinVertex {
    pub fn rigid(position: Vec3, tangent: Vec3, normal: Vec4, uv: Vec2, bone: u8) -> Self {
        Self {
            position,
            tangent,
            normal,
            uv,
            influence_bones: [bone, 0, 0, 0],
            influence_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    fn from_file(vertex: &meshfile::Vertex, rigid: bool) -> Self {
        Self {
            position: Vec3::from_array(vertex.position),
            tangent: Vec3::from_array(vertex.tangent),
            normal: Vec4::from_array(vertex.normal),
            uv: Vec2::from_array(vertex.uv),
            influence_bones: vertex.bones,
            influence_weights: if rigid { [1.0, 0.0, 0.0, 0.0] } else { vertex.weights },
        }
    }
}

/// A skin partition: rigid vertices followed by soft vertices, sharing one bone map.
///
/// Only checked against its vertices once it goes into [`LodModel::new`].
#[derive(Clone, Debug)]
pub struct SkinChunk {
    /// chunk slot => skeleton bone index
    bone_map: Vec<u16>,
    /// 1..=4, soft vertices never read past this many influences
    max_bone_influences: usize,
    /// first vertex of this chunk in the LOD vertex array
    base_vertex: usize,
    num_rigid: usize,
    num_soft: usize,
}

impl SkinChunk {
    pub fn new(bone_map: Vec<u16>, max_bone_influences: usize, base_vertex: usize, num_rigid: usize, num_soft: usize) -> Self {
        Self { bone_map, max_bone_influences, base_vertex, num_rigid, num_soft }
    }

    pub fn bone_map(&self) -> &[u16] {
        &self.bone_map
    }

    pub fn max_bone_influences(&self) -> usize {
        self.max_bone_influences
    }

    pub fn base_vertex(&self) -> usize {
        self.base_vertex
    }

    pub fn num_rigid(&self) -> usize {
        self.num_rigid
    }

    pub fn num_soft(&self) -> usize {
        self.num_soft
    }

    pub fn num_vertices(&self) -> usize {
        self.num_rigid + self.num_soft
    }

    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.base_vertex..self.base_vertex + self.num_vertices()
    }
}

#[derive(Clone, Debug)]
pub struct LodModel {
    chunks: Vec<SkinChunk>,
    vertices: Vec<SkinVertex>,
}

impl LodModel {
    /// Chunks must tile `vertices` contiguously and in order.
    pub fn new(chunks: Vec<SkinChunk>, vertices: Vec<SkinVertex>, bone_count: usize) -> Result<Self> {
        let mut next_vertex = 0;
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let invalid = |reason: String| RigError::InvalidChunk { chunk: chunk_idx, reason };
            if chunk.base_vertex != next_vertex {
                return Err(invalid(format!("starts at vertex {}, expected {}", chunk.base_vertex, next_vertex)));
            }
            if !(1..=MAX_INFLUENCES).contains(&chunk.max_bone_influences) {
                return Err(invalid(format!("max_bone_influences {} outside 1..=4", chunk.max_bone_influences)));
            }
            if let Some(&bone) = chunk.bone_map.iter().find(|&&b| b as usize >= bone_count) {
                return Err(RigError::InvalidBoneIndex { index: bone as usize, count: bone_count });
            }
            let range = chunk.vertex_range();
            if range.end > vertices.len() {
                return Err(invalid(format!("vertex range {:?} exceeds {} vertices", range, vertices.len())));
            }
            for (offset, vertex) in vertices[range.clone()].iter().enumerate() {
                let used = if offset < chunk.num_rigid { 1 } else { chunk.max_bone_influences };
                if vertex.influence_bones[..used].iter().any(|&slot| slot as usize >= chunk.bone_map.len()) {
                    return Err(invalid(format!("vertex {} references a slot outside the bone map", range.start + offset)));
                }
            }
            next_vertex = range.end;
        }
        if next_vertex != vertices.len() {
            return Err(RigError::InvalidChunk {
                chunk: chunks.len(),
                reason: format!("{} trailing vertices not covered by any chunk", vertices.len() - next_vertex),
            });
        }
        Ok(Self { chunks, vertices })
    }

    pub fn chunks(&self) -> &[SkinChunk] {
        &self.chunks
    }

    pub fn vertices(&self) -> &[SkinVertex] {
        &self.vertices
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
}

/// Skinned mesh asset bound to a skeleton.
#[derive(Debug)]
pub struct SkeletalMesh {
    pub skeleton: Arc<Skeleton>,
    /// never empty
    lods: Vec<LodModel>,
    pub morphs: Vec<Arc<MorphTarget>>,
}

impl SkeletalMesh {
    pub fn new(skeleton: Arc<Skeleton>, lods: Vec<LodModel>, morphs: Vec<Arc<MorphTarget>>) -> Result<Self> {
        if lods.is_empty() {
            return Err(RigError::InvalidLod { lod: 0, count: 0 });
        }
        Ok(Self { skeleton, lods, morphs })
    }

    pub fn from_file(file: &meshfile::SkinnedMesh, skeleton: Arc<Skeleton>) -> Result<Self> {
        let bone_count = skeleton.bone_count();
        if file.bone_count as usize != bone_count {
            return Err(RigError::MeshSkeletonMismatch { expected: file.bone_count as usize, actual: bone_count });
        }

        let mut lods = Vec::with_capacity(file.lods.len());
        for lod in &file.lods {
            let mut chunks = Vec::with_capacity(lod.chunks.len());
            let mut vertices = Vec::new();
            for chunk in &lod.chunks {
                let base_vertex = vertices.len();
                vertices.extend(chunk.rigid_vertices.iter().map(|v| SkinVertex::from_file(v, true)));
                vertices.extend(chunk.soft_vertices.iter().map(|v| SkinVertex::from_file(v, false)));
                chunks.push(SkinChunk::new(
                    chunk.bone_map.clone(),
                    chunk.max_bone_influences as usize,
                    base_vertex,
                    chunk.rigid_vertices.len(),
                    chunk.soft_vertices.len(),
                ));
            }
            lods.push(LodModel::new(chunks, vertices, bone_count)?);
        }

        let morphs = file
            .morphs
            .iter()
            .map(|morph| MorphTarget::from_file(morph).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Self::new(skeleton, lods, morphs)
    }

    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    pub fn lods(&self) -> &[LodModel] {
        &self.lods
    }

    /// Out of range requests fall back to the lowest detail LOD.
    pub fn clamp_lod(&self, lod: usize) -> usize {
        lod.min(self.lods.len().saturating_sub(1))
    }

    /// The model for `lod` after clamping.
    pub fn lod(&self, lod: usize) -> &LodModel {
        &self.lods[self.clamp_lod(lod)]
    }

    pub fn find_morph(&self, name: &str) -> Option<&Arc<MorphTarget>> {
        self.morphs.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::{morph::MorphVertex, skeleton::tests::test_skeleton};

    fn skin_vertex(position: Vec3, bones: [u8; 4], weights: [f32; 4]) -> SkinVertex {
        SkinVertex {
            influence_bones: bones,
            influence_weights: weights,
            ..SkinVertex::rigid(position, Vec3::X, Vec4::new(0.0, 0.0, 1.0, 1.0), Vec2::ZERO, 0)
        }
    }

    /// Two chunks over the test skeleton at LOD 0, one rigid chunk at LOD 1,
    /// and a "bulge" morph touching vertices 2 and 5.
    pub(crate) fn test_mesh() -> SkeletalMesh {
        let skeleton = Arc::new(test_skeleton());
        let lod0 = LodModel::new(
            vec![
                SkinChunk::new(vec![1, 2, 3], 2, 0, 2, 2),
                SkinChunk::new(vec![4, 5], 2, 4, 1, 1),
            ],
            vec![
                skin_vertex(Vec3::new(0.0, 1.2, 0.0), [0, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                skin_vertex(Vec3::new(0.0, 2.2, 0.0), [1, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                skin_vertex(Vec3::new(0.0, 2.0, 0.0), [0, 1, 0, 0], [0.5, 0.5, 0.0, 0.0]),
                skin_vertex(Vec3::new(0.0, 2.6, 0.0), [1, 2, 0, 0], [0.25, 0.75, 0.0, 0.0]),
                skin_vertex(Vec3::new(0.8, 1.8, 0.0), [0, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                skin_vertex(Vec3::new(1.5, 1.8, 0.0), [0, 1, 0, 0], [0.625, 0.375, 0.0, 0.0]),
            ],
            skeleton.bone_count(),
        )
        .unwrap();
        let lod1 = LodModel::new(
            vec![SkinChunk::new(vec![1, 4], 1, 0, 2, 0)],
            vec![
                skin_vertex(Vec3::new(0.0, 1.5, 0.0), [0, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                skin_vertex(Vec3::new(1.0, 1.8, 0.0), [1, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
            ],
            skeleton.bone_count(),
        )
        .unwrap();
        let bulge = MorphTarget::new(
            "bulge",
            vec![
                vec![
                    MorphVertex { source_index: 2, position_delta: Vec3::new(0.2, 0.0, 0.0), normal_delta: Vec3::new(0.0, 0.5, 0.0) },
                    MorphVertex { source_index: 5, position_delta: Vec3::new(0.0, 0.2, 0.0), normal_delta: Vec3::ZERO },
                ],
                vec![],
            ],
        )
        .unwrap();
        SkeletalMesh::new(skeleton, vec![lod0, lod1], vec![Arc::new(bulge)]).unwrap()
    }

    fn vertex(bones: [u8; 4]) -> SkinVertex {
        SkinVertex {
            influence_bones: bones,
            influence_weights: [0.5, 0.5, 0.0, 0.0],
            ..SkinVertex::rigid(Vec3::ZERO, Vec3::X, Vec4::new(0.0, 0.0, 1.0, 1.0), Vec2::ZERO, 0)
        }
    }

    #[test]
    fn chunks_must_tile_vertices() {
        let chunk = SkinChunk::new(vec![0, 1], 2, 0, 1, 1);
        assert!(LodModel::new(vec![chunk.clone()], vec![vertex([0, 0, 0, 0]), vertex([0, 1, 0, 0])], 2).is_ok());
        assert!(matches!(
            LodModel::new(vec![chunk.clone()], vec![vertex([0, 0, 0, 0]); 3], 2),
            Err(RigError::InvalidChunk { chunk: 1, .. })
        ));
        assert!(matches!(
            LodModel::new(vec![chunk], vec![vertex([0, 0, 0, 0]), vertex([0, 2, 0, 0])], 2),
            Err(RigError::InvalidChunk { chunk: 0, .. })
        ));
    }

    #[test]
    fn test_mesh_is_valid() {
        let mesh = test_mesh();
        assert_eq!(mesh.lod_count(), 2);
        assert_eq!(mesh.clamp_lod(7), 1);
        assert_eq!(mesh.lod(0).num_vertices(), 6);
        assert!(mesh.find_morph("bulge").is_some());
        assert!(mesh.find_morph("missing").is_none());
    }

    #[test]
    fn bone_map_is_checked_against_skeleton() {
        let chunk = SkinChunk::new(vec![0, 7], 1, 0, 1, 0);
        assert!(matches!(
            LodModel::new(vec![chunk], vec![vertex([0, 0, 0, 0])], 3),
            Err(RigError::InvalidBoneIndex { index: 7, count: 3 })
        ));
    }

    #[test]
    fn chunk_headers_are_checked() {
        let vertices = vec![vertex([0, 0, 0, 0]); 2];
        let too_many_influences = SkinChunk::new(vec![0], 5, 0, 0, 2);
        assert!(matches!(LodModel::new(vec![too_many_influences], vertices.clone(), 1), Err(RigError::InvalidChunk { chunk: 0, .. })));
        let gap = vec![SkinChunk::new(vec![0], 1, 0, 1, 0), SkinChunk::new(vec![0], 1, 2, 1, 0)];
        assert!(matches!(LodModel::new(gap, vertices.clone(), 1), Err(RigError::InvalidChunk { chunk: 1, .. })));

        let lod = LodModel::new(vec![SkinChunk::new(vec![0], 1, 0, 2, 0)], vertices, 1).unwrap();
        assert_eq!(lod.chunks()[0].num_rigid(), 2);
        assert_eq!(lod.vertices().len(), 2);
    }
}
