//! In-memory cache of the parsed manifest file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dset_types::Revision;
use tracing::debug;

use crate::error::ManifestResult;
use crate::manifest_file::ManifestMap;

/// Holds the parsed manifest for one revision.
///
/// The cached copy is reused while both the revision and the manifest file's
/// modification time are unchanged; otherwise the file is parsed again.
#[derive(Debug)]
pub struct ManifestFileCache {
    path: PathBuf,
    cached: Option<CachedManifest>,
}

#[derive(Debug)]
struct CachedManifest {
    revision: Revision,
    file_mtime: Option<SystemTime>,
    map: ManifestMap,
}

impl ManifestFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    pub fn is_fresh(&self, revision: &Revision) -> bool {
        matches!(
            &self.cached,
            Some(c) if &c.revision == revision && c.file_mtime == self.file_mtime()
        )
    }

    /// The manifest for `revision`, reloading from disk when stale.
    pub fn load(&mut self, revision: &Revision) -> ManifestResult<&mut ManifestMap> {
        let cached = match self.cached.take() {
            Some(c) if c.revision == *revision && c.file_mtime == self.file_mtime() => c,
            _ => {
                debug!(revision = %revision.short(), "loading manifest file");
                CachedManifest {
                    revision: revision.clone(),
                    file_mtime: self.file_mtime(),
                    map: ManifestMap::load(&self.path)?,
                }
            }
        };
        Ok(&mut self.cached.insert(cached).map)
    }

    /// Write the cached manifest to disk and record the new file mtime.
    pub fn persist(&mut self) -> ManifestResult<()> {
        let Some(cached) = self.cached.as_ref() else {
            return Ok(());
        };
        cached.map.save(&self.path)?;
        let mtime = self.file_mtime();
        if let Some(cached) = self.cached.as_mut() {
            cached.file_mtime = mtime;
        }
        Ok(())
    }

    /// Drop the cached copy; the next `load` re-reads the file.
    pub fn evict(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ManifestEntry;
    use tempfile::TempDir;

    fn rev(s: &str) -> Revision {
        Revision::parse(s).unwrap()
    }

    #[test]
    fn reloads_on_revision_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let mut cache = ManifestFileCache::new(&path);

        cache
            .load(&rev("aa"))
            .unwrap()
            .insert("unsaved/".into(), ManifestEntry::directory(1.0));
        assert!(cache.is_fresh(&rev("aa")));
        assert!(cache.load(&rev("aa")).unwrap().contains("unsaved/"));

        // A different revision re-reads the (empty) file.
        assert!(!cache.is_fresh(&rev("bb")));
        assert!(cache.load(&rev("bb")).unwrap().is_empty());
    }

    #[test]
    fn persist_keeps_cache_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m/manifest.json");
        let mut cache = ManifestFileCache::new(&path);
        cache
            .load(&rev("aa"))
            .unwrap()
            .insert("d/".into(), ManifestEntry::directory(1.0));
        cache.persist().unwrap();
        assert!(cache.is_fresh(&rev("aa")));
        assert!(path.exists());
    }

    #[test]
    fn evict_forces_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let mut cache = ManifestFileCache::new(&path);
        cache
            .load(&rev("aa"))
            .unwrap()
            .insert("x/".into(), ManifestEntry::directory(1.0));
        cache.evict();
        assert!(!cache.is_fresh(&rev("aa")));
        assert!(cache.load(&rev("aa")).unwrap().is_empty());
    }
}
