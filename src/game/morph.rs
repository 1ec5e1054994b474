use std::sync::Arc;

use glam::Vec3;

use crate::{config::MorphConfig, resource_system::file_formats::meshfile, Result, RigError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MorphVertex {
    /// base mesh vertex this delta applies to
    pub source_index: u32,
    pub position_delta: Vec3,
    pub normal_delta: Vec3,
}

/// Named set of sparse per-vertex offsets, one list per LOD.
#[derive(Debug)]
pub struct MorphTarget {
    pub name: String,
    lods: Vec<Vec<MorphVertex>>,
}

impl MorphTarget {
    pub fn new(name: impl Into<String>, lods: Vec<Vec<MorphVertex>>) -> Result<Self> {
        let name = name.into();
        for (lod, vertices) in lods.iter().enumerate() {
            if vertices.windows(2).any(|w| w[0].source_index >= w[1].source_index) {
                return Err(RigError::UnsortedMorphVertices { morph: name, lod });
            }
        }
        Ok(Self { name, lods })
    }

    pub fn from_file(file: &meshfile::Morph) -> Result<Self> {
        let lods = file
            .lods
            .iter()
            .map(|lod| {
                lod.iter()
                    .map(|v| MorphVertex {
                        source_index: v.source_index,
                        position_delta: Vec3::from_array(v.position_delta),
                        normal_delta: Vec3::from_array(v.normal_delta),
                    })
                    .collect()
            })
            .collect();
        Self::new(file.name.clone(), lods)
    }

    /// Empty when this morph has no data for `lod`.
    pub fn lod_vertices(&self, lod: usize) -> &[MorphVertex] {
        self.lods.get(lod).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Debug)]
pub struct ActiveMorph {
    pub target: Arc<MorphTarget>,
    pub weight: f32,
}

impl ActiveMorph {
    pub fn new(target: Arc<MorphTarget>, weight: f32) -> Self {
        Self { target, weight }
    }

    fn is_valid(&self, lod: usize, config: &MorphConfig) -> bool {
        self.weight >= config.min_weight
            && self.weight <= config.max_weight
            && !self.target.lod_vertices(lod).is_empty()
    }
}

/// Summed delta of all valid active morphs for one base vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MorphDelta {
    pub vertex: u32,
    pub position: Vec3,
    pub normal: Vec3,
}

/// Sparse per-vertex deltas, strictly increasing by vertex index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphDeltas {
    entries: Vec<MorphDelta>,
}

impl MorphDeltas {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[MorphDelta] {
        &self.entries
    }

    pub fn get(&self, vertex: u32) -> Option<&MorphDelta> {
        self.entries
            .binary_search_by_key(&vertex, |d| d.vertex)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Forward-only cursor positioned at the first delta at or after `first_vertex`.
    pub fn cursor_from(&self, first_vertex: u32) -> MorphCursor<'_> {
        let next = self.entries.partition_point(|d| d.vertex < first_vertex);
        MorphCursor { entries: &self.entries, next }
    }
}

pub struct MorphCursor<'a> {
    entries: &'a [MorphDelta],
    next: usize,
}

impl<'a> MorphCursor<'a> {
    /// Must be called with non-decreasing vertex indices.
    pub fn delta_for(&mut self, vertex: u32) -> Option<&'a MorphDelta> {
        while let Some(delta) = self.entries.get(self.next) {
            if delta.vertex > vertex {
                return None;
            }
            self.next += 1;
            if delta.vertex == vertex {
                return Some(delta);
            }
        }
        None
    }
}

/// Merges the deltas of every valid active morph with one forward cursor per morph.
///
/// Position deltas scale by the morph weight, which may exceed 1 for
/// exaggeration. Normal deltas use the weight clamped to 1.
pub fn accumulate_morphs(active: &[ActiveMorph], lod: usize, config: &MorphConfig) -> MorphDeltas {
    let sources: Vec<(&[MorphVertex], f32)> = active
        .iter()
        .filter(|morph| morph.is_valid(lod, config))
        .map(|morph| (morph.target.lod_vertices(lod), morph.weight))
        .collect();
    if sources.is_empty() {
        return MorphDeltas::default();
    }

    let capacity = sources.iter().map(|(v, _)| v.len()).max().unwrap_or(0);
    let mut entries = Vec::with_capacity(capacity);
    let mut cursors = vec![0usize; sources.len()];
    loop {
        let next_vertex = sources
            .iter()
            .zip(&cursors)
            .filter_map(|((vertices, _), &cursor)| vertices.get(cursor).map(|v| v.source_index))
            .min();
        let Some(vertex) = next_vertex else { break };

        let mut delta = MorphDelta { vertex, position: Vec3::ZERO, normal: Vec3::ZERO };
        for ((vertices, weight), cursor) in sources.iter().zip(cursors.iter_mut()) {
            if let Some(v) = vertices.get(*cursor).filter(|v| v.source_index == vertex) {
                delta.position += v.position_delta * *weight;
                delta.normal += v.normal_delta * weight.min(1.0);
                *cursor += 1;
            }
        }
        entries.push(delta);
    }

    MorphDeltas { entries }
}
