//! Procedural bone controllers spliced into pose composition.
//!
//! Controllers live in a [`ControllerTable`] arena. Each skeleton bone has an
//! optional chain of controllers linked through `next` indices, evaluated in
//! the order they were added.

use std::any::Any;

use glam::{Mat4, Vec3};

use super::{pose::Trs, skeleton::Skeleton};

pub mod bone_scale;
pub mod limb;
pub mod look_at;
pub mod single_bone;
pub mod strength;

pub use bone_scale::BoneScaleControl;
pub use limb::LimbControl;
pub use look_at::LookAtControl;
pub use single_bone::{BoneControlMode, SingleBoneControl};
pub use strength::ControlStrength;

/// Per-frame values passed explicitly to everything that ticks once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    /// increases by one every producer frame
    pub generation: u64,
    pub dt: f32,
    pub lod: usize,
    pub recently_rendered: bool,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            generation: 0,
            dt: 0.0,
            lod: 0,
            recently_rendered: true,
        }
    }
}

/// Read-only view of the pose a controller computes its targets from.
pub struct ControlContext<'a> {
    pub skeleton: &'a Skeleton,
    /// the bone the controller is attached to
    pub bone: usize,
    pub local: &'a [Trs],
    /// up to date for the controller's bone, its ancestors and its affected bones
    pub component: &'a [Mat4],
    pub frame: &'a FrameContext,
}

impl ControlContext<'_> {
    pub fn component_position(&self, bone: usize) -> Vec3 {
        self.component[bone].w_axis.truncate()
    }
}

/// What a controller wants for one affected bone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTarget {
    /// component-space transform, None keeps the animated pose
    pub transform: Option<Mat4>,
    /// uniform scale folded into the bone after `transform`
    pub scale: Option<f32>,
}

impl BoneTarget {
    pub fn transform(transform: Mat4) -> Self {
        Self { transform: Some(transform), scale: None }
    }

    pub fn scale(scale: f32) -> Self {
        Self { transform: None, scale: Some(scale) }
    }
}

pub trait BoneController: Send {
    /// Bones this controller overrides when attached to `bone`. Anything not
    /// `bone` itself or one of its descendants is dropped by the composer.
    fn affected_bones(&self, skeleton: &Skeleton, bone: usize, out: &mut Vec<usize>);

    /// Pushes one target per entry of `affected`, in the same order.
    fn compute_targets(&mut self, cx: &ControlContext, affected: &[usize], out: &mut Vec<BoneTarget>);

    /// Controller specific weight, multiplied with the node's [`ControlStrength`].
    fn strength(&self) -> f32 {
        1.0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type ControllerId = usize;

pub struct ControllerNode {
    pub controller: Box<dyn BoneController>,
    pub strength: ControlStrength,
    /// skipped when the current LOD is above this
    pub max_lod: usize,
    /// skipped when the owner has not been rendered recently and the
    /// controller config allows it
    pub ignore_when_not_rendered: bool,
    /// the bone and its hierarchy are evaluated in the first pass
    pub priority: bool,
    /// `set_active` on this node also reaches the nodes after it in the chain
    pub propagate_active: bool,
    bone: usize,
    next: Option<ControllerId>,
    last_tick: Option<u64>,
}

impl ControllerNode {
    pub fn new(controller: Box<dyn BoneController>) -> Self {
        Self {
            controller,
            strength: ControlStrength::default(),
            max_lod: usize::MAX,
            ignore_when_not_rendered: false,
            priority: false,
            propagate_active: false,
            bone: 0,
            next: None,
            last_tick: None,
        }
    }

    pub fn with_strength(mut self, strength: ControlStrength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_max_lod(mut self, max_lod: usize) -> Self {
        self.max_lod = max_lod;
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ignore_when_not_rendered(mut self, ignore: bool) -> Self {
        self.ignore_when_not_rendered = ignore;
        self
    }

    pub fn with_propagate_active(mut self, propagate: bool) -> Self {
        self.propagate_active = propagate;
        self
    }

    pub fn bone(&self) -> usize {
        self.bone
    }

    /// Node strength times the controller's own weight.
    pub fn effective_strength(&self) -> f32 {
        self.strength.current() * self.controller.strength()
    }

    pub(crate) fn tick(&mut self, frame: &FrameContext) {
        if self.last_tick == Some(frame.generation) {
            return;
        }
        self.last_tick = Some(frame.generation);
        self.strength.tick(frame.dt);
    }
}

/// Arena of controller nodes with one chain head per bone.
pub struct ControllerTable {
    nodes: Vec<ControllerNode>,
    heads: Vec<Option<ControllerId>>,
}

impl ControllerTable {
    pub fn new(bone_count: usize) -> Self {
        Self {
            nodes: Vec::new(),
            heads: vec![None; bone_count],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Appends `node` to the end of `bone`'s chain. Returns None when the bone
    /// does not exist.
    pub fn add(&mut self, bone: usize, mut node: ControllerNode) -> Option<ControllerId> {
        if bone >= self.heads.len() {
            log::warn!("controller attached to bone {bone}, skeleton has {} bones", self.heads.len());
            return None;
        }
        let id = self.nodes.len();
        node.bone = bone;
        node.next = None;
        let tail = self.chain(bone).last();
        match tail {
            Some(tail) => self.nodes[tail].next = Some(id),
            None => self.heads[bone] = Some(id),
        }
        self.nodes.push(node);
        Some(id)
    }

    pub fn node(&self, id: ControllerId) -> Option<&ControllerNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: ControllerId) -> Option<&mut ControllerNode> {
        self.nodes.get_mut(id)
    }

    /// Typed access to a controller, e.g. to move an IK target.
    pub fn controller_mut<C: BoneController + 'static>(&mut self, id: ControllerId) -> Option<&mut C> {
        self.nodes.get_mut(id)?.controller.as_any_mut().downcast_mut::<C>()
    }

    /// Node ids attached to `bone` in evaluation order.
    pub fn chain(&self, bone: usize) -> ChainIter<'_> {
        ChainIter {
            nodes: &self.nodes,
            next: self.heads.get(bone).copied().flatten(),
        }
    }

    pub fn has_chain(&self, bone: usize) -> bool {
        matches!(self.heads.get(bone), Some(Some(_)))
    }

    pub fn set_active(&mut self, id: ControllerId, active: bool) {
        let mut current = Some(id);
        while let Some(idx) = current {
            let Some(node) = self.nodes.get_mut(idx) else { break };
            node.strength.set_active(active);
            current = if node.propagate_active { node.next } else { None };
        }
    }

    /// Advances every node's strength at most once per frame generation.
    pub fn tick(&mut self, frame: &FrameContext) {
        for node in &mut self.nodes {
            node.tick(frame);
        }
    }

    /// Bones of nodes flagged as priority roots.
    pub fn priority_roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().filter(|node| node.priority).map(|node| node.bone)
    }
}

pub struct ChainIter<'a> {
    nodes: &'a [ControllerNode],
    next: Option<ControllerId>,
}

impl Iterator for ChainIter<'_> {
    type Item = ControllerId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.nodes[id].next;
        Some(id)
    }
}
