use std::sync::Arc;

use super::skeleton::Skeleton;

/// Strictly increasing, parent-closed set of bones to evaluate this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RequiredBones {
    lod: usize,
    bones: Vec<usize>,
    mask: Vec<bool>,
}

impl RequiredBones {
    /// The LOD this set was built for, after clamping.
    pub fn lod(&self) -> usize {
        self.lod
    }

    pub fn bones(&self) -> &[usize] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn contains(&self, bone: usize) -> bool {
        self.mask.get(bone).copied().unwrap_or(false)
    }
}

/// Starts from the LOD's static bone list and merges `extra` into it,
/// inserting whatever ancestors the extra bones are missing.
///
/// A LOD past the last one clamps to the lowest detail LOD. Extra bones
/// outside the skeleton are ignored.
pub fn select_required_bones(skeleton: &Skeleton, lod: usize, extra: &[usize]) -> RequiredBones {
    let last_lod = skeleton.lod_count() - 1;
    let lod = if lod > last_lod {
        log::debug!("LOD {lod} clamped to {last_lod}");
        last_lod
    } else {
        lod
    };

    let count = skeleton.bone_count();
    let mut mask = vec![false; count];
    for &bone in skeleton.lod_required_bones(lod) {
        mask[bone] = true;
    }

    let mut inserted = false;
    for &bone in extra {
        if bone >= count {
            log::warn!("extra required bone {bone} out of range for {count} bones");
            continue;
        }
        let mut current = Some(bone);
        while let Some(idx) = current {
            if mask[idx] {
                break;
            }
            mask[idx] = true;
            inserted = true;
            current = skeleton.parent(idx);
        }
    }

    let bones = if inserted {
        mask.iter().enumerate().filter_map(|(idx, &required)| required.then_some(idx)).collect()
    } else {
        skeleton.lod_required_bones(lod).to_vec()
    };

    RequiredBones { lod, bones, mask }
}

/// Reuses the last [`RequiredBones`] until the LOD, the skeleton or the
/// extra bone sources change.
#[derive(Default)]
pub struct RequiredBonesCache {
    current: Option<(CacheKey, RequiredBones)>,
}

struct CacheKey {
    skeleton: Arc<Skeleton>,
    lod: usize,
    extra_revision: u64,
}

impl CacheKey {
    fn matches(&self, skeleton: &Arc<Skeleton>, lod: usize, extra_revision: u64) -> bool {
        Arc::ptr_eq(&self.skeleton, skeleton) && self.lod == lod && self.extra_revision == extra_revision
    }
}

impl RequiredBonesCache {
    /// `extra_revision` must change whenever the contents of `extra` change.
    pub fn get(&mut self, skeleton: &Arc<Skeleton>, lod: usize, extra: &[usize], extra_revision: u64) -> &RequiredBones {
        let current = match self.current.take() {
            Some((key, required)) if key.matches(skeleton, lod, extra_revision) => (key, required),
            _ => {
                log::debug!("recomputing required bones for LOD {lod}");
                let key = CacheKey { skeleton: skeleton.clone(), lod, extra_revision };
                (key, select_required_bones(skeleton, lod, extra))
            }
        };
        &self.current.insert(current).1
    }

    pub fn invalidate(&mut self) {
        self.current = None;
    }
}
