use std::{fs::File, io::BufReader, path::Path};

use serde::de::DeserializeOwned;

use crate::Result;

pub mod meshfile;
pub mod skeletonfile;

pub(crate) fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
