//! # Snapshot Persistence
//!
//! State-dict style files: each snapshot is one bincode file mapping tensor
//! names to `(shape, flat data)`. `DirPersistence` writes one file per
//! snapshot into a directory, so any prefix of a run remains a valid partial
//! ensemble.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::params::{Elem, ParameterVector};

/// Errors local to the snapshot file format.
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("stored tensor '{key}' has inconsistent shape {shape:?} for {len} elements")]
    BadShape {
        key: String,
        shape: Vec<usize>,
        len: usize,
    },
}

/// Durable storage for parameter vectors keyed by snapshot name.
pub trait SnapshotPersistence {
    fn write(&self, key: &str, params: &ParameterVector) -> Result<(), PersistError>;

    /// Every stored snapshot in ascending key order.
    fn read_all(&self) -> Result<Vec<(String, ParameterVector)>, PersistError>;
}

// --- File format ---

#[derive(Serialize, Deserialize)]
struct StoredTensor {
    shape: Vec<usize>,
    data: Vec<Elem>,
}

type StoredDict = BTreeMap<String, StoredTensor>;

fn to_stored(params: &ParameterVector) -> StoredDict {
    params
        .iter()
        .map(|(name, tensor)| {
            (
                name.to_string(),
                StoredTensor {
                    shape: tensor.shape().to_vec(),
                    data: tensor.iter().copied().collect(),
                },
            )
        })
        .collect()
}

fn from_stored(dict: StoredDict) -> Result<ParameterVector, PersistError> {
    let mut params = ParameterVector::new();
    for (key, stored) in dict {
        let len = stored.data.len();
        let tensor = ArrayD::from_shape_vec(IxDyn(&stored.shape), stored.data).map_err(|_| {
            PersistError::BadShape {
                key: key.clone(),
                shape: stored.shape.clone(),
                len,
            }
        })?;
        params.insert(key, tensor);
    }
    Ok(params)
}

/// One bincode file per snapshot under a directory.
#[derive(Debug, Clone)]
pub struct DirPersistence {
    dir: PathBuf,
}

impl DirPersistence {
    /// Creates the directory if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotPersistence for DirPersistence {
    fn write(&self, key: &str, params: &ParameterVector) -> Result<(), PersistError> {
        let file = File::create(self.path_for(key))?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, &to_stored(params))?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<(String, ParameterVector)>, PersistError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "bin") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let file = File::open(self.path_for(&key))?;
            let reader = BufReader::new(file);
            let dict: StoredDict = bincode::deserialize_from(reader)?;
            out.push((key, from_stored(dict)?));
        }
        Ok(out)
    }
}
