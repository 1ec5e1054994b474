pub mod bones;
pub mod skinned_storage;
pub mod skinning;
