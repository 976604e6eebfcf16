use std::fs;
use std::path::{Path, PathBuf};

use dset_types::Revision;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::object_store::ObjectStore;
use crate::push_queue::PushQueue;

/// Name of the object store directory under the cache root.
pub const OBJECTS_DIR: &str = "objects";

/// Owns the on-disk cache of one dataset for one user.
///
/// Layout:
///
/// ```text
/// {cache_root}/
///   objects/            shared object store
///   objects/.push/      push queue files
///   {revision}/         one working directory per revision
/// ```
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_root: PathBuf,
    objects: ObjectStore,
    push_queue: PushQueue,
}

impl CacheManager {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        let cache_root = cache_root.into();
        let objects_root = cache_root.join(OBJECTS_DIR);
        Self {
            objects: ObjectStore::new(&objects_root),
            push_queue: PushQueue::new(&objects_root),
            cache_root,
        }
    }

    /// Cache root for `{cache_base}/{username}/{namespace}/{dataset_name}`.
    pub fn for_dataset(cache_base: &Path, username: &str, namespace: &str, dataset: &str) -> Self {
        Self::new(cache_base.join(username).join(namespace).join(dataset))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn push_queue(&self) -> &PushQueue {
        &self.push_queue
    }

    /// `{cache_root}/{revision}`
    pub fn revision_dir(&self, revision: &Revision) -> PathBuf {
        self.cache_root.join(revision.as_str())
    }

    /// Create the revision directory (and the object root) if missing.
    pub fn ensure_revision_dir(&self, revision: &Revision) -> StoreResult<PathBuf> {
        let dir = self.revision_dir(revision);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        fs::create_dir_all(self.objects.root())
            .map_err(|e| StoreError::io(self.objects.root(), e))?;
        Ok(dir)
    }

    /// Remove a revision's working directory. Objects are untouched.
    pub fn delete_revision_dir(&self, revision: &Revision) -> StoreResult<()> {
        let dir = self.revision_dir(revision);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(revision = %revision, "removed stale revision directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(revision = %revision, "revision directory already absent");
                Ok(())
            }
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    /// Revisions that currently have a working directory.
    pub fn revision_dirs(&self) -> StoreResult<Vec<Revision>> {
        let entries = match fs::read_dir(&self.cache_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.cache_root, e)),
        };
        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.cache_root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == OBJECTS_DIR {
                continue;
            }
            if let Ok(rev) = Revision::parse(name) {
                revisions.push(rev);
            }
        }
        revisions.sort();
        Ok(revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_under_cache_root() {
        let cache = CacheManager::for_dataset(Path::new("/cache"), "alice", "ns", "ds");
        assert_eq!(cache.cache_root(), Path::new("/cache/alice/ns/ds"));
        assert_eq!(cache.objects().root(), Path::new("/cache/alice/ns/ds/objects"));
        assert_eq!(
            cache.push_queue().dir(),
            Path::new("/cache/alice/ns/ds/objects/.push")
        );
        let rev = Revision::parse("abc").unwrap();
        assert_eq!(cache.revision_dir(&rev), Path::new("/cache/alice/ns/ds/abc"));
    }

    #[test]
    fn revision_dir_lifecycle() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());
        let a = Revision::parse("aaaa").unwrap();
        let b = Revision::parse("bbbb").unwrap();

        cache.ensure_revision_dir(&a).unwrap();
        cache.ensure_revision_dir(&b).unwrap();
        fs::write(cache.revision_dir(&a).join("f"), b"x").unwrap();
        assert_eq!(cache.revision_dirs().unwrap(), vec![a.clone(), b.clone()]);

        cache.delete_revision_dir(&a).unwrap();
        assert_eq!(cache.revision_dirs().unwrap(), vec![b]);
        cache.delete_revision_dir(&a).unwrap();
    }

    #[test]
    fn missing_cache_root_has_no_revisions() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path().join("nothing"));
        assert!(cache.revision_dirs().unwrap().is_empty());
    }
}
