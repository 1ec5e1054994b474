use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::{
    game::{
        mesh::{LodModel, SkinChunk, SkinVertex},
        morph::{MorphDelta, MorphDeltas},
    },
    render_snapshot::DynamicSnapshot,
};

/// GPU-ready skinned vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// w = handedness of the skinned tangent basis
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_vertices(vertices: &[SkinnedVertex]) -> Option<Self> {
        let first = Vec3::from_array(vertices.first()?.position);
        let (min, max) = vertices.iter().fold((first, first), |(min, max), v| {
            let p = Vec3::from_array(v.position);
            (min.min(p), max.max(p))
        });
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// Skins the snapshot's LOD of its mesh into a new buffer.
pub fn skin(snapshot: &DynamicSnapshot, parallel: bool) -> Vec<SkinnedVertex> {
    let mut out = Vec::new();
    skin_snapshot_into(snapshot, parallel, &mut out);
    out
}

pub fn skin_snapshot_into(snapshot: &DynamicSnapshot, parallel: bool, out: &mut Vec<SkinnedVertex>) {
    skin_into(snapshot.mesh.lod(snapshot.lod), &snapshot.ref_to_current, &snapshot.morph_deltas, parallel, out);
}

/// Skins every chunk of `lod_model` by the reference-to-current `bones`.
///
/// Chunks are independent and may run on the rayon pool. Within a vertex the
/// influences always accumulate in slot order, so parallel and sequential
/// runs produce identical bytes.
pub fn skin_into(lod_model: &LodModel, bones: &[Mat4], morphs: &MorphDeltas, parallel: bool, out: &mut Vec<SkinnedVertex>) {
    out.clear();
    out.resize(lod_model.num_vertices(), SkinnedVertex::default());

    let mut work = Vec::with_capacity(lod_model.chunks().len());
    let mut rest = out.as_mut_slice();
    for chunk in lod_model.chunks() {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(chunk.num_vertices());
        work.push((chunk, head));
        rest = tail;
    }

    let vertices = lod_model.vertices();
    if parallel {
        work.into_par_iter()
            .for_each(|(chunk, out)| skin_chunk(chunk, &vertices[chunk.vertex_range()], bones, morphs, out));
    } else {
        for (chunk, out) in work {
            skin_chunk(chunk, &vertices[chunk.vertex_range()], bones, morphs, out);
        }
    }
}

fn skin_chunk(chunk: &SkinChunk, vertices: &[SkinVertex], bones: &[Mat4], morphs: &MorphDeltas, out: &mut [SkinnedVertex]) {
    let matrices: Vec<Mat4> = chunk
        .bone_map()
        .iter()
        .map(|&bone| match bones.get(bone as usize) {
            Some(m) => *m,
            None => {
                log::debug!("bone {bone} missing from snapshot, skinning with identity");
                Mat4::IDENTITY
            }
        })
        .collect();

    let mut cursor = morphs.cursor_from(chunk.base_vertex() as u32);
    for (offset, (vertex, out)) in vertices.iter().zip(out.iter_mut()).enumerate() {
        let delta = cursor.delta_for((chunk.base_vertex() + offset) as u32);
        let matrix = if offset < chunk.num_rigid() {
            matrices[vertex.influence_bones[0] as usize]
        } else {
            blend_matrices(&matrices, vertex, chunk.max_bone_influences())
        };
        *out = skin_vertex(vertex, &matrix, delta);
    }
}

/// Sum of `weight * matrix` over the first `influences` slots, in slot order.
fn blend_matrices(matrices: &[Mat4], vertex: &SkinVertex, influences: usize) -> Mat4 {
    let mut blended = Mat4::ZERO;
    for slot in 0..influences {
        blended += matrices[vertex.influence_bones[slot] as usize] * vertex.influence_weights[slot];
    }
    blended
}

fn skin_vertex(vertex: &SkinVertex, matrix: &Mat4, delta: Option<&MorphDelta>) -> SkinnedVertex {
    let source_normal = vertex.normal.truncate();
    let bitangent = source_normal.cross(vertex.tangent) * vertex.normal.w;

    // morphs are authored in reference pose space
    let (position, normal) = match delta {
        Some(delta) => (
            vertex.position + delta.position,
            (source_normal + delta.normal).try_normalize().unwrap_or(source_normal),
        ),
        None => (vertex.position, source_normal),
    };

    let position = matrix.transform_point3(position);
    let normal = matrix.transform_vector3(normal).try_normalize().unwrap_or(Vec3::Z);
    let tangent = matrix.transform_vector3(vertex.tangent);
    let bitangent = matrix.transform_vector3(bitangent);

    // Gram-Schmidt against the final normal
    let tangent = (tangent - normal * normal.dot(tangent))
        .try_normalize()
        .unwrap_or_else(|| normal.any_orthonormal_vector());
    let handedness = if normal.cross(tangent).dot(bitangent) < 0.0 { -1.0 } else { 1.0 };

    SkinnedVertex {
        position: position.to_array(),
        normal: normal.to_array(),
        tangent: tangent.extend(handedness).to_array(),
        uv: vertex.uv.to_array(),
    }
}
