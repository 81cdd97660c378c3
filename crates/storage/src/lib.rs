//! Storage layer: persisted index artifacts.
//!
//! An index run produces three files in one directory: a bincode blob for
//! the ANN structure, a position-aligned JSON metadata array, and a small
//! JSON record of the embedding-provider configuration used at build time.
//! Writes go through a temp file + rename so a crash cannot leave a
//! half-written artifact behind.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const PROVIDER_FILE: &str = "provider.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("decode error on {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

/// Embedding-provider record stored next to the index blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub fingerprint: String,
    pub dimension: usize,
}

/// Paths of the three artifact files under one index directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn index(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn metadata(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn provider(&self) -> PathBuf {
        self.dir.join(PROVIDER_FILE)
    }

    pub fn exists(&self) -> bool {
        self.index().exists() && self.metadata().exists() && self.provider().exists()
    }
}

pub fn save_blob<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = bincode::serialize(value).map_err(|e| StorageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    atomic_write(path, &bytes)?;
    tracing::info!("saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub fn load_blob<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = read(path)?;
    bincode::deserialize(&bytes).map_err(|e| StorageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    atomic_write(path, &bytes)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read(path: &Path) -> Result<Vec<u8>, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.to_path_buf()));
    }
    fs::read(path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let io_err = |e: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
