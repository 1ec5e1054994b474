//! Producer side: everything that runs before the snapshot handoff.

pub mod composer;
pub mod controllers;
pub mod mesh;
pub mod morph;
pub mod pose;
pub mod required_bones;
pub mod rig;
pub mod root_motion;
pub mod skeleton;
