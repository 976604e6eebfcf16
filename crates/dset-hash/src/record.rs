//! Fast-hash records and the persisted per-revision index.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HashError, HashResult};

/// Cheap "did it possibly change" signature for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastHashRecord {
    /// Modification time, seconds since the epoch with sub-second precision.
    pub mtime: f64,
    /// File size in bytes.
    pub size_bytes: u64,
}

impl FastHashRecord {
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        Self {
            mtime: mtime_secs(meta),
            size_bytes: if meta.is_dir() { 0 } else { meta.len() },
        }
    }

    /// String form stored alongside hashes: `"{key}||{size}||{mtime}"`.
    pub fn signature(&self, key: &str) -> String {
        format!("{key}||{}||{}", self.size_bytes, self.mtime)
    }
}

/// Modification time of `meta` as fractional seconds.
///
/// Pre-epoch or unavailable times map to `0.0`, which only ever causes a
/// spurious "changed" result.
pub fn mtime_secs(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Key -> [`FastHashRecord`] map, scoped to a single revision directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FastHashIndex {
    records: BTreeMap<String, FastHashRecord>,
}

impl FastHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a persisted index. A missing file yields an empty index; an
    /// unreadable one is discarded with a warning since every entry can be
    /// recomputed.
    pub fn load(path: &Path) -> HashResult<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(HashError::io(path, e)),
        };
        match serde_json::from_slice(&data) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt fast-hash index");
                Ok(Self::default())
            }
        }
    }

    /// Atomically write the index (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> HashResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| HashError::io(dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| HashError::io(dir, e))?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush().map_err(|e| HashError::io(path, e))?;
        tmp.persist(path)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FastHashRecord> {
        self.records.get(key)
    }

    pub fn insert(&mut self, key: String, record: FastHashRecord) {
        self.records.insert(key, record);
    }

    pub fn remove(&mut self, key: &str) -> Option<FastHashRecord> {
        self.records.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
