use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use crate::{resource_system::file_formats::skeletonfile, Result, RigError};

use super::pose::Trs;

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    /// None only for bone 0
    pub parent: Option<usize>,
    /// reference pose relative to the parent
    pub reference: Trs,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, reference: Trs) -> Self {
        Self {
            name: name.into(),
            parent,
            reference,
        }
    }
}

/// Immutable, validated bone hierarchy.
///
/// Bones are topologically sorted: every bone's parent has a smaller index,
/// and bone 0 is the single root. Per-LOD required bone lists are strictly
/// increasing and parent-closed.
#[derive(Debug)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    reference_component: Vec<Mat4>,
    reference_inverse: Vec<Mat4>,
    lods: Vec<Vec<usize>>,
}

impl Skeleton {
    /// `lods[i]` lists the bones LOD `i` must evaluate. An empty list, or no
    /// lists at all for LOD 0, means every bone.
    pub fn new(bones: Vec<Bone>, lods: Vec<Vec<usize>>) -> Result<Self> {
        if bones.is_empty() {
            return Err(RigError::EmptySkeleton);
        }

        let count = bones.len();
        let mut name_to_index = HashMap::with_capacity(count);
        for (idx, bone) in bones.iter().enumerate() {
            match (idx, bone.parent) {
                (0, None) => (),
                (0, Some(parent)) => return Err(RigError::ParentNotBeforeChild { bone: 0, parent }),
                (_, None) => return Err(RigError::MultipleRoots(idx)),
                (_, Some(parent)) if parent >= idx => return Err(RigError::ParentNotBeforeChild { bone: idx, parent }),
                _ => (),
            }
            if name_to_index.insert(bone.name.clone(), idx).is_some() {
                return Err(RigError::DuplicateBoneName(bone.name.clone()));
            }
        }

        let mut reference_component = Vec::with_capacity(count);
        for bone in &bones {
            let local = bone.reference.to_matrix();
            let component = match bone.parent {
                Some(parent) => reference_component[parent] * local,
                None => local,
            };
            reference_component.push(component);
        }
        let reference_inverse = reference_component.iter().map(|m| m.inverse()).collect();

        let all_bones: Vec<usize> = (0..count).collect();
        let mut lods = lods;
        if lods.is_empty() {
            lods.push(Vec::new());
        }
        for (lod, required) in lods.iter_mut().enumerate() {
            if required.is_empty() {
                *required = all_bones.clone();
                continue;
            }
            validate_required(&bones, lod, required)?;
        }

        Ok(Self {
            bones,
            name_to_index,
            reference_component,
            reference_inverse,
            lods,
        })
    }

    pub fn from_file(file: &skeletonfile::Skeleton) -> Result<Self> {
        let bones = file
            .joints
            .iter()
            .map(|joint| Bone {
                name: joint.name.clone(),
                parent: joint.parent.map(|p| p as usize),
                reference: Trs::new(
                    Vec3::from_array(joint.translation),
                    Quat::from_array(joint.rotation),
                    Vec3::from_array(joint.scale),
                ),
            })
            .collect();
        let lods = file
            .lods
            .iter()
            .map(|lod| lod.iter().map(|&b| b as usize).collect())
            .collect();
        Self::new(bones, lods).inspect_err(|err| log::warn!("rejected skeleton: {err}"))
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, idx: usize) -> &Bone {
        &self.bones[idx]
    }

    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.bones[idx].parent
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Component-space reference pose.
    pub fn reference_component(&self) -> &[Mat4] {
        &self.reference_component
    }

    /// Maps reference-pose component space back into each bone's local space.
    pub fn reference_inverse(&self) -> &[Mat4] {
        &self.reference_inverse
    }

    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    pub fn lod_required_bones(&self, lod: usize) -> &[usize] {
        &self.lods[lod]
    }

    /// True when `ancestor` lies on the parent chain of `bone` (a bone is not its own ancestor).
    pub fn is_ancestor(&self, ancestor: usize, bone: usize) -> bool {
        let mut current = self.bones[bone].parent;
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            if idx < ancestor {
                return false;
            }
            current = self.bones[idx].parent;
        }
        false
    }
}

fn validate_required(bones: &[Bone], lod: usize, required: &[usize]) -> Result<()> {
    let count = bones.len();
    let mut present = vec![false; count];
    let mut prev: Option<usize> = None;
    for &idx in required {
        if idx >= count {
            return Err(RigError::InvalidBoneIndex { index: idx, count });
        }
        if prev.is_some_and(|p| p >= idx) {
            return Err(RigError::NotParentClosed { lod, bone: idx });
        }
        if let Some(parent) = bones[idx].parent {
            if !present[parent] {
                return Err(RigError::NotParentClosed { lod, bone: idx });
            }
        }
        present[idx] = true;
        prev = Some(idx);
    }
    Ok(())
}
