//! The two-tier hasher bound to one revision directory.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dset_types::{ContentHash, Revision};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{HashError, HashResult};
use crate::record::{FastHashIndex, FastHashRecord};

/// File name of the persisted fast-hash index inside a revision directory.
pub const FAST_HASH_INDEX_FILE: &str = ".smarthash";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Number of concurrent full-hash workers.
///
/// An explicit non-zero override wins; otherwise the available parallelism
/// of the host, never less than 1.
pub fn get_num_hashing_cpus(override_cpus: Option<usize>) -> usize {
    match override_cpus {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

/// BLAKE3 over the raw bytes of `path`, streamed in 64 KiB chunks.
pub fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(ContentHash::from_blake3(hasher.finalize()))
}

/// Fast-hash index plus full hashing for the keys of one revision directory.
///
/// Records are only trustworthy for the revision they were computed under;
/// a hasher is therefore created per revision and rebuilt on relink.
pub struct SmartHasher {
    revision_dir: PathBuf,
    revision: Revision,
    index: FastHashIndex,
    num_workers: usize,
}

impl std::fmt::Debug for SmartHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartHasher")
            .field("revision_dir", &self.revision_dir)
            .field("revision", &self.revision)
            .field("records", &self.index.len())
            .field("num_workers", &self.num_workers)
            .finish()
    }
}

impl SmartHasher {
    /// Open the hasher for `revision_dir`, loading any persisted index.
    pub fn open(
        revision_dir: impl Into<PathBuf>,
        revision: Revision,
        num_workers: usize,
    ) -> HashResult<Self> {
        let revision_dir = revision_dir.into();
        let index = FastHashIndex::load(&revision_dir.join(FAST_HASH_INDEX_FILE))?;
        debug!(
            revision = %revision,
            records = index.len(),
            "opened fast-hash index"
        );
        Ok(Self {
            revision_dir,
            revision,
            index,
            num_workers: num_workers.max(1),
        })
    }

    pub fn revision_dir(&self) -> &Path {
        &self.revision_dir
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn index(&self) -> &FastHashIndex {
        &self.index
    }

    fn index_path(&self) -> PathBuf {
        self.revision_dir.join(FAST_HASH_INDEX_FILE)
    }

    /// Whether a fast-hash record exists for `key` under this revision.
    pub fn is_cached(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Compare the current `(mtime, size)` of `key` with its record.
    ///
    /// Any doubt (no record, file missing, metadata unreadable) answers
    /// `true`: a spurious rehash is acceptable, a skipped change is not.
    pub fn has_changed_fast(&self, key: &str) -> bool {
        let Some(stored) = self.index.get(key) else {
            return true;
        };
        match std::fs::metadata(self.revision_dir.join(key)) {
            Ok(meta) => FastHashRecord::from_metadata(&meta) != *stored,
            Err(_) => true,
        }
    }

    /// Full content hash for each key, computed concurrently.
    ///
    /// The result is positionally aligned with `keys`. A key that fails to
    /// hash yields `None`; callers must treat that as a hard error.
    pub async fn hash(&self, keys: &[String]) -> Vec<Option<ContentHash>> {
        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let mut tasks = JoinSet::new();

        for (idx, key) in keys.iter().enumerate() {
            let path = self.revision_dir.join(key);
            let key = key.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = tokio::task::spawn_blocking(move || hash_file(&path)).await;
                (idx, key, result)
            });
        }

        let mut hashes = vec![None; keys.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(Ok(hash)))) => hashes[idx] = Some(hash),
                Ok((_, key, Ok(Err(e)))) => {
                    warn!(key = %key, error = %e, "failed to hash file");
                }
                Ok((_, key, Err(e))) => {
                    warn!(key = %key, error = %e, "hash worker failed");
                }
                Err(e) => warn!(error = %e, "hash task failed"),
            }
        }
        hashes
    }

    /// Compute the fast-hash signature of each key.
    ///
    /// With `save`, the records replace the stored ones and the index is
    /// persisted. Keys whose metadata cannot be read yield `None`.
    pub fn fast_hash(&mut self, keys: &[String], save: bool) -> HashResult<Vec<Option<String>>> {
        let mut signatures = Vec::with_capacity(keys.len());
        for key in keys {
            match std::fs::metadata(self.revision_dir.join(key)) {
                Ok(meta) => {
                    let record = FastHashRecord::from_metadata(&meta);
                    signatures.push(Some(record.signature(key)));
                    if save {
                        self.index.insert(key.clone(), record);
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to stat file for fast hash");
                    signatures.push(None);
                }
            }
        }
        if save {
            self.persist()?;
        }
        Ok(signatures)
    }

    /// Tracked keys that are absent from `observed`.
    pub fn get_deleted_files(&self, observed: &[String]) -> Vec<String> {
        let observed: HashSet<&str> = observed.iter().map(String::as_str).collect();
        self.index
            .keys()
            .filter(|k| !observed.contains(k.as_str()))
            .cloned()
            .collect()
    }

    /// Drop the records for `keys` and persist.
    pub fn delete_fast_hashes(&mut self, keys: &[String]) -> HashResult<()> {
        for key in keys {
            self.index.remove(key);
        }
        self.persist()
    }

    /// Drop every record and persist the empty index.
    pub fn clear(&mut self) -> HashResult<()> {
        self.index.clear();
        self.persist()
    }

    /// Write the index to `{revision_dir}/.smarthash`.
    pub fn persist(&self) -> HashResult<()> {
        if !self.revision_dir.is_dir() {
            return Err(HashError::io(
                &self.revision_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "revision directory missing"),
            ));
        }
        self.index.save(&self.index_path())
    }
}
