//! The manifest orchestrator.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dset_hash::{get_num_hashing_cpus, SmartHasher, FAST_HASH_INDEX_FILE};
use dset_ledger::{ActivityRecord, ActivityStore, ActivityType, VersionedLog};
use dset_store::{CacheManager, PromoteOutcome, PullObject};
use dset_types::{
    dir_key, is_dir_key, key_from_relative, natural_cmp, parent_key, ContentHash, Revision,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::activity;
use crate::cache::ManifestFileCache;
use crate::entry::{FileInfo, ManifestEntry, StatusResult};
use crate::error::{ManifestError, ManifestResult};
use crate::manifest_file::ManifestMap;

/// Manifest location relative to the dataset root.
pub const MANIFEST_DIR: &str = "manifest";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Files in a revision directory that are never part of the dataset.
const IGNORED_FILES: &[&str] = &[FAST_HASH_INDEX_FILE, ".DS_Store"];

/// Placeholder used by version-control tooling to keep empty directories.
const DIR_PLACEHOLDER: &str = ".gitkeep";

/// Tunables for a [`Manifest`].
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// Override for the number of hashing workers.
    pub num_hashing_cpus: Option<usize>,
    /// Revision directories that must survive a sweep (referenced elsewhere).
    pub pinned_revisions: BTreeSet<Revision>,
}

/// Authoritative `key -> (hash, size, mtime)` mapping of the current revision,
/// and the operations that keep it in step with the revision directory.
///
/// A manifest assumes a single writer for the duration of each call.
pub struct Manifest {
    dataset_root: PathBuf,
    cache: CacheManager,
    log: Arc<dyn VersionedLog>,
    activity: Arc<dyn ActivityStore>,
    options: ManifestOptions,
    revision: Revision,
    hasher: SmartHasher,
    file_cache: ManifestFileCache,
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("dataset_root", &self.dataset_root)
            .field("cache_root", &self.cache.cache_root())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Manifest {
    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Initialize a dataset with an empty manifest and its first commit.
    pub fn create(
        dataset_root: impl Into<PathBuf>,
        cache: CacheManager,
        log: Arc<dyn VersionedLog>,
        activity: Arc<dyn ActivityStore>,
        options: ManifestOptions,
    ) -> ManifestResult<Self> {
        let dataset_root = dataset_root.into();
        let manifest_path = manifest_path(&dataset_root);
        if !manifest_path.exists() {
            ManifestMap::new().save(&manifest_path)?;
        }
        log.add_all()?;
        let revision = log.commit("Created new empty dataset")?;
        activity.create_activity_record(
            ActivityRecord::new(ActivityType::Dataset, "Created new empty dataset")
                .with_linked_commit(revision.clone())
                .with_importance(255)
                .with_tags(["dataset"]),
        )?;
        info!(revision = %revision.short(), root = %dataset_root.display(), "created dataset");
        Self::open(dataset_root, cache, log, activity, options)
    }

    /// Open the manifest at the log's head revision.
    ///
    /// A revision directory that does not exist yet is created and linked.
    pub fn open(
        dataset_root: impl Into<PathBuf>,
        cache: CacheManager,
        log: Arc<dyn VersionedLog>,
        activity: Arc<dyn ActivityStore>,
        options: ManifestOptions,
    ) -> ManifestResult<Self> {
        let dataset_root = dataset_root.into();
        let revision = log.head()?.ok_or(ManifestError::NoRevision)?;
        let fresh = !cache.revision_dir(&revision).is_dir();
        let revision_dir = cache.ensure_revision_dir(&revision)?;
        let workers = get_num_hashing_cpus(options.num_hashing_cpus);
        let hasher = SmartHasher::open(revision_dir, revision.clone(), workers)?;
        let file_cache = ManifestFileCache::new(manifest_path(&dataset_root));

        let mut manifest = Self {
            dataset_root,
            cache,
            log,
            activity,
            options,
            revision,
            hasher,
            file_cache,
        };
        if fresh {
            manifest.link_revision()?;
        }
        Ok(manifest)
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn log(&self) -> &Arc<dyn VersionedLog> {
        &self.log
    }

    pub fn activity(&self) -> &Arc<dyn ActivityStore> {
        &self.activity
    }

    /// The revision the manifest currently reflects.
    pub fn dataset_revision(&self) -> &Revision {
        &self.revision
    }

    /// `{cache_root}/{revision}`
    pub fn current_revision_dir(&self) -> PathBuf {
        self.cache.revision_dir(&self.revision)
    }

    pub fn hasher(&self) -> &SmartHasher {
        &self.hasher
    }

    fn map(&mut self) -> ManifestResult<&mut ManifestMap> {
        self.file_cache.load(&self.revision)
    }

    pub fn len(&mut self) -> ManifestResult<usize> {
        Ok(self.map()?.len())
    }

    pub fn is_empty(&mut self) -> ManifestResult<bool> {
        Ok(self.map()?.is_empty())
    }

    pub fn total_bytes(&mut self) -> ManifestResult<u64> {
        Ok(self.map()?.total_bytes())
    }

    /// Whether the key's bytes are present in the revision directory.
    pub fn is_local(&self, key: &str) -> bool {
        let path = self.current_revision_dir().join(key);
        if is_dir_key(key) {
            path.is_dir()
        } else {
            path.is_file()
        }
    }

    // ---------------------------------------------------------------
    // Status and update
    // ---------------------------------------------------------------

    /// Classify every path under the revision directory.
    ///
    /// Directories are reported as created when absent from the manifest but
    /// never as modified. Deletions are the tracked keys no longer observed.
    pub fn status(&mut self) -> ManifestResult<StatusResult> {
        let revision_dir = self.current_revision_dir();
        let observed = observe(&revision_dir)?;

        let map = self.file_cache.load(&self.revision)?;
        let mut status = StatusResult::new();
        for key in &observed {
            if !map.contains(key) {
                status.created.push(key.clone());
            } else if is_dir_key(key) {
                continue;
            } else if !self.hasher.is_cached(key) || self.hasher.has_changed_fast(key) {
                status.modified.push(key.clone());
            }
        }
        status.deleted = self.hasher.get_deleted_files(&observed);
        status.normalize();
        debug!(
            created = status.created.len(),
            modified = status.modified.len(),
            deleted = status.deleted.len(),
            "computed status"
        );
        Ok(status)
    }

    /// Bring the manifest in line with `status` (computed when `None`).
    ///
    /// Created and modified files are hashed and promoted before their rows
    /// are written; deleted keys lose their fast-hash record and row. The
    /// manifest is persisted even when nothing changed.
    pub async fn update(&mut self, status: Option<StatusResult>) -> ManifestResult<StatusResult> {
        let mut status = match status {
            Some(status) => status,
            None => self.status()?,
        };
        status.normalize();

        let changed: Vec<String> = status
            .created
            .iter()
            .chain(&status.modified)
            .cloned()
            .collect();
        let (dirs, files): (Vec<String>, Vec<String>) =
            changed.iter().cloned().partition(|k| is_dir_key(k));

        let hashes = if files.is_empty() {
            Vec::new()
        } else {
            self.hash_files(&files).await?.0
        };
        if !dirs.is_empty() {
            self.hasher.fast_hash(&dirs, true)?;
        }
        if !status.deleted.is_empty() {
            self.hasher.delete_fast_hashes(&status.deleted)?;
        }

        let hash_of: HashMap<&str, &ContentHash> =
            files.iter().map(String::as_str).zip(&hashes).collect();
        let mut rows = Vec::with_capacity(changed.len());
        for key in &changed {
            let record = self.hasher.index().get(key).copied();
            let (size, mtime) = record.map(|r| (r.size_bytes, r.mtime)).unwrap_or((0, 0.0));
            let entry = if is_dir_key(key) {
                ManifestEntry::directory(mtime)
            } else {
                match hash_of.get(key.as_str()) {
                    Some(hash) => ManifestEntry::file((*hash).clone(), size, mtime),
                    None => return Err(ManifestError::HashFailed(vec![key.clone()])),
                }
            };
            rows.push((key.clone(), entry));
        }

        let map = self.file_cache.load(&self.revision)?;
        for (key, entry) in rows {
            map.insert(key, entry);
        }
        map.remove_many(&status.deleted);
        self.file_cache.persist()?;

        info!(
            created = status.created.len(),
            modified = status.modified.len(),
            deleted = status.deleted.len(),
            "updated manifest"
        );
        Ok(status)
    }

    /// Hash, promote and fast-hash `keys`, in that order.
    ///
    /// All full hashes complete before any promotion starts, and all
    /// promotions complete before the fast hashes are taken. Any key that
    /// fails to hash aborts the call before the store is touched. Newly
    /// stored objects are queued for push under the current revision.
    pub async fn hash_files(
        &mut self,
        keys: &[String],
    ) -> ManifestResult<(Vec<ContentHash>, Vec<String>)> {
        let results = self.hasher.hash(keys).await;
        let failed: Vec<String> = keys
            .iter()
            .zip(&results)
            .filter(|(_, h)| h.is_none())
            .map(|(k, _)| k.clone())
            .collect();
        if !failed.is_empty() {
            return Err(ManifestError::HashFailed(failed));
        }
        let hashes: Vec<ContentHash> = results.into_iter().flatten().collect();

        let outcomes = self.promote_all(keys, &hashes).await?;
        let queued: Vec<(String, PathBuf)> = keys
            .iter()
            .zip(&hashes)
            .zip(&outcomes)
            .filter(|(_, outcome)| **outcome == PromoteOutcome::Stored)
            .map(|((key, hash), _)| (key.clone(), self.cache.objects().object_path(hash)))
            .collect();
        self.cache.push_queue().enqueue(&self.revision, &queued)?;

        // Promotion relinks the revision copy, so signatures are taken after it.
        let signatures = self.hasher.fast_hash(keys, true)?;
        let mut fast = Vec::with_capacity(signatures.len());
        let mut missing = Vec::new();
        for (key, sig) in keys.iter().zip(signatures) {
            match sig {
                Some(sig) => fast.push(sig),
                None => missing.push(key.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ManifestError::HashFailed(missing));
        }
        debug!(
            files = keys.len(),
            stored = queued.len(),
            "hashed and promoted files"
        );
        Ok((hashes, fast))
    }

    async fn promote_all(
        &self,
        keys: &[String],
        hashes: &[ContentHash],
    ) -> ManifestResult<Vec<PromoteOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.hasher.num_workers()));
        let revision_dir = self.current_revision_dir();
        let mut tasks = JoinSet::new();

        for (idx, (key, hash)) in keys.iter().zip(hashes).enumerate() {
            let objects = self.cache.objects().clone();
            let src = revision_dir.join(key);
            let hash = hash.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = tokio::task::spawn_blocking(move || objects.promote(&src, &hash)).await;
                (idx, result)
            });
        }

        let mut outcomes = vec![None; keys.len()];
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(Ok(outcome)))) => outcomes[idx] = Some(outcome),
                Ok((_, Ok(Err(e)))) => {
                    first_error.get_or_insert(ManifestError::from(e));
                }
                Ok((_, Err(e))) | Err(e) => {
                    first_error.get_or_insert(ManifestError::from(e));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(outcomes.into_iter().flatten().collect())
    }

    /// Record an object for a future push under the current revision.
    pub fn queue_to_push(&self, key: &str, hash: &ContentHash) -> ManifestResult<()> {
        let entry = (key.to_string(), self.cache.objects().object_path(hash));
        self.cache.push_queue().enqueue(&self.revision, &[entry])?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Read accessors
    // ---------------------------------------------------------------

    pub fn gen_file_info(&mut self, key: &str) -> ManifestResult<FileInfo> {
        let entry = self
            .map()?
            .get(key)
            .cloned()
            .ok_or_else(|| ManifestError::NotFound(key.to_string()))?;
        Ok(FileInfo {
            key: key.to_string(),
            is_dir: is_dir_key(key),
            size_bytes: entry.size_bytes,
            modified_at: entry.mtime,
            is_local: self.is_local(key),
        })
    }

    pub fn get(&mut self, key: &str) -> ManifestResult<FileInfo> {
        self.gen_file_info(key)
    }

    /// One page of the manifest in insertion order.
    ///
    /// `first` bounds the page size and must be positive. Without
    /// `after_index` the page starts at position 0; otherwise right after it.
    pub fn list(
        &mut self,
        first: i64,
        after_index: Option<i64>,
    ) -> ManifestResult<Vec<(usize, FileInfo)>> {
        if first <= 0 {
            return Err(ManifestError::InvalidPagination(format!(
                "`first` must be greater than 0, got {first}"
            )));
        }
        let start = match after_index {
            None => 0,
            Some(i) if i < 0 => {
                return Err(ManifestError::InvalidPagination(format!(
                    "`after` must be at least 0, got {i}"
                )))
            }
            Some(i) => usize::try_from(i).unwrap_or(usize::MAX).saturating_add(1),
        };
        let page_size = usize::try_from(first).unwrap_or(usize::MAX);
        let keys: Vec<String> = self
            .map()?
            .keys()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        let mut page = Vec::with_capacity(keys.len());
        for (offset, key) in keys.iter().enumerate() {
            page.push((start + offset, self.gen_file_info(key)?));
        }
        Ok(page)
    }

    /// Pull units for file entries whose objects are not in the local store.
    ///
    /// With `keys`, only those entries (and everything under directory keys)
    /// are considered.
    pub fn objects_to_pull(&mut self, keys: Option<&[String]>) -> ManifestResult<Vec<PullObject>> {
        let revision = self.revision.clone();
        let objects = self.cache.objects().clone();
        let map = self.map()?;

        let selected: Vec<String> = match keys {
            None => map.keys().cloned().collect(),
            Some(keys) => {
                let mut selected = Vec::new();
                for key in keys {
                    if is_dir_key(key) {
                        selected.extend(map.keys_under(key));
                    } else if map.contains(key) {
                        selected.push(key.clone());
                    } else {
                        return Err(ManifestError::NotFound(key.clone()));
                    }
                }
                selected
            }
        };

        let mut seen = HashSet::new();
        let mut pulls = Vec::new();
        for key in selected {
            let Some(hash) = map.get(&key).and_then(|e| e.hash.as_ref()) else {
                continue;
            };
            let object_path = objects.object_path(hash);
            if objects.contains(hash) || !seen.insert(object_path.clone()) {
                continue;
            }
            pulls.push(PullObject {
                object_path,
                revision: revision.clone(),
                dataset_path: key,
            });
        }
        Ok(pulls)
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Remove top-level keys from the revision directory, then sweep.
    ///
    /// Deleting a directory removes everything under it, materialized or not.
    /// A key that exists neither locally nor in the manifest is an error.
    pub async fn delete(&mut self, keys: &[String]) -> ManifestResult<StatusResult> {
        let revision_dir = self.current_revision_dir();

        // Every key is checked before anything is removed. A key under one
        // deleted earlier in the same call no longer exists.
        let mut plan: Vec<(String, PathBuf, Option<fs::Metadata>, bool)> = Vec::new();
        for key in keys {
            let path = revision_dir.join(key.trim_end_matches('/'));
            let local = fs::symlink_metadata(&path).ok();
            let key = match &local {
                Some(meta) if meta.is_dir() => dir_key(key),
                _ => key.clone(),
            };
            if plan.iter().any(|(_, planned, _, _)| path.starts_with(planned)) {
                return Err(ManifestError::NotFound(key));
            }
            let known = self.map()?.contains(&key);
            if local.is_none() && !known {
                return Err(ManifestError::NotFound(key));
            }
            plan.push((key, path, local, known));
        }

        let mut explicit = Vec::new();
        for (key, path, local, known) in plan {
            match local {
                Some(meta) if meta.is_dir() => {
                    fs::remove_dir_all(&path).map_err(|e| ManifestError::io(&path, e))?
                }
                Some(_) => fs::remove_file(&path).map_err(|e| ManifestError::io(&path, e))?,
                None => {}
            }
            if known {
                if is_dir_key(&key) {
                    explicit.extend(self.map()?.keys_under(&key));
                } else {
                    explicit.push(key);
                }
            }
        }

        let mut status = self.status()?;
        status.deleted.extend(explicit);
        status.normalize();
        self.sweep(false, None, Some(status), false).await
    }

    /// Rename a file or directory inside the revision directory, then sweep.
    ///
    /// When `dest` is an existing directory the source is moved into it.
    /// Returns file info for the moved key and, for directories, every
    /// descendant: subdirectories first in sorted order, then files.
    pub async fn move_key(&mut self, src: &str, dest: &str) -> ManifestResult<Vec<FileInfo>> {
        let revision_dir = self.current_revision_dir();
        let src_rel = src.trim_end_matches('/');
        let src_path = revision_dir.join(src_rel);
        let src_local = fs::symlink_metadata(&src_path).ok();
        let src_is_dir = match &src_local {
            Some(meta) => meta.is_dir(),
            None => is_dir_key(src),
        };
        let src_key = if src_is_dir {
            dir_key(src_rel)
        } else {
            src_rel.to_string()
        };
        if src_local.is_none() && !self.map()?.contains(&src_key) {
            return Err(ManifestError::NotFound(src.to_string()));
        }

        let mut dest_rel = dest.trim_end_matches('/').to_string();
        let mut dest_path = revision_dir.join(&dest_rel);
        if dest_path.is_dir() {
            let name = Path::new(src_rel)
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ManifestError::InvalidMove(src.to_string()))?;
            dest_rel = format!("{dest_rel}/{name}");
            dest_path = dest_path.join(name);
        }
        let dest_key = key_from_relative(Path::new(&dest_rel), src_is_dir)?;
        key_from_relative(Path::new(src_rel), src_is_dir)?;

        if fs::symlink_metadata(&dest_path).is_ok() || self.map()?.contains(&dest_key) {
            return Err(ManifestError::InvalidMove(format!(
                "destination `{dest_key}` already exists"
            )));
        }
        if src_is_dir && dest_key.starts_with(&src_key) {
            return Err(ManifestError::InvalidMove(format!(
                "cannot move `{src_key}` into itself"
            )));
        }
        if let Some(parent) = dest_path.parent() {
            if !parent.is_dir() {
                return Err(ManifestError::InvalidMove(format!(
                    "parent of `{dest_key}` does not exist"
                )));
            }
        }

        if src_local.is_some() {
            fs::rename(&src_path, &dest_path).map_err(|e| ManifestError::io(&src_path, e))?;
        }
        let renamed = self.rename_unmaterialized(&src_key, &dest_key)?;

        let kind = if src_is_dir { "directory" } else { "file" };
        let extra = format!("Moved {kind} `{src}` to `{dest}`");
        self.sweep(false, Some(&extra), None, renamed > 0).await?;

        if !src_is_dir {
            return Ok(vec![self.gen_file_info(&dest_key)?]);
        }

        let descendants = self.map()?.keys_under(&dest_key);
        let mut dirs: Vec<String> = descendants
            .iter()
            .filter(|k| is_dir_key(k) && **k != dest_key)
            .cloned()
            .collect();
        let mut files: Vec<String> = descendants
            .iter()
            .filter(|k| !is_dir_key(k))
            .filter(|k| !k.ends_with(&format!("/{DIR_PLACEHOLDER}")))
            .cloned()
            .collect();
        dirs.sort_by(|a, b| natural_cmp(a, b));
        files.sort_by(|a, b| natural_cmp(a, b));

        let mut infos = vec![self.gen_file_info(&dest_key)?];
        for key in dirs.iter().chain(&files) {
            infos.push(self.gen_file_info(key)?);
        }
        Ok(infos)
    }

    /// Carry manifest rows that have no local bytes across a rename.
    fn rename_unmaterialized(&mut self, src_key: &str, dest_key: &str) -> ManifestResult<usize> {
        let revision_dir = self.current_revision_dir();
        let map = self.file_cache.load(&self.revision)?;
        let candidates = if is_dir_key(src_key) {
            map.keys_under(src_key)
        } else if map.contains(src_key) {
            vec![src_key.to_string()]
        } else {
            Vec::new()
        };

        let mut moved = Vec::new();
        for key in candidates {
            let new_key = format!("{dest_key}{}", &key[src_key.len()..]);
            if revision_dir.join(&new_key).exists() {
                continue;
            }
            if let Some(entry) = map.get(&key).cloned() {
                moved.push((key, new_key, entry));
            }
        }
        if moved.is_empty() {
            return Ok(0);
        }
        let old: Vec<String> = moved.iter().map(|(k, _, _)| k.clone()).collect();
        map.remove_many(&old);
        for (_, new_key, entry) in &moved {
            map.insert(new_key.clone(), entry.clone());
        }
        self.file_cache.persist()?;
        debug!(count = moved.len(), "renamed unmaterialized entries");
        Ok(moved.len())
    }

    /// Create an empty directory and commit it.
    ///
    /// Not idempotent: an existing directory is an error, as is a missing
    /// parent. Other unsaved changes are committed along with it.
    pub async fn create_directory(&mut self, path: &str) -> ManifestResult<FileInfo> {
        let key = key_from_relative(Path::new(path.trim_end_matches('/')), true)?;
        let dir_path = self.current_revision_dir().join(&key);
        if dir_path.exists() || self.map()?.contains(&key) {
            return Err(ManifestError::AlreadyExists(key));
        }
        if let Some(parent) = parent_key(&key) {
            if !self.current_revision_dir().join(&parent).is_dir() {
                return Err(ManifestError::ParentMissing(parent));
            }
        }
        // Pending changes are recorded in the same commit; the revision
        // directory holding them is replaced.
        let mut status = self.status()?;
        let pending = !status.is_empty();
        fs::create_dir(&dir_path).map_err(|e| ManifestError::io(&dir_path, e))?;
        status.created.push(key.clone());
        status.normalize();
        let status = self.update(Some(status)).await?;

        let headline = format!("Created new empty directory `{key}`");
        let (message, record) = if pending {
            let message = activity::sweep_message(&status, false, Some(&headline));
            let record = activity::sweep_record(&status, false, &message);
            (message, record)
        } else {
            let record = activity::directory_record(&key, &headline);
            (headline, record)
        };
        self.commit_and_relink(&message, record)?;
        self.gen_file_info(&key)
    }

    /// Commit every local change as a new revision.
    ///
    /// update, then commit and activity record, then relink into the new
    /// revision directory, then remove the superseded one. If any step
    /// fails the previous revision directory is left intact. A sweep with
    /// nothing to record creates no commit.
    pub async fn sweep_all_changes(
        &mut self,
        upload: bool,
        extra_msg: Option<&str>,
        status: Option<StatusResult>,
    ) -> ManifestResult<StatusResult> {
        self.sweep(upload, extra_msg, status, false).await
    }

    async fn sweep(
        &mut self,
        upload: bool,
        extra_msg: Option<&str>,
        status: Option<StatusResult>,
        manifest_changed: bool,
    ) -> ManifestResult<StatusResult> {
        let status = self.update(status).await?;
        if status.is_empty() && !manifest_changed {
            info!("no changes to sweep");
            return Ok(status);
        }
        let message = activity::sweep_message(&status, upload, extra_msg);
        let record = activity::sweep_record(&status, upload, &message);
        self.commit_and_relink(&message, record)?;
        Ok(status)
    }

    fn commit_and_relink(&mut self, message: &str, record: ActivityRecord) -> ManifestResult<()> {
        let previous = self.revision.clone();
        self.log.add_all()?;
        let revision = self.log.commit(message)?;
        self.activity
            .create_activity_record(record.with_linked_commit(revision.clone()))?;

        self.switch_revision(revision)?;
        self.link_revision()?;

        if previous != self.revision {
            if self.options.pinned_revisions.contains(&previous) {
                debug!(revision = %previous.short(), "keeping pinned revision directory");
            } else {
                self.cache.delete_revision_dir(&previous)?;
            }
        }
        info!(
            from = %previous.short(),
            to = %self.revision.short(),
            "swept changes into new revision"
        );
        Ok(())
    }

    fn switch_revision(&mut self, revision: Revision) -> ManifestResult<()> {
        let revision_dir = self.cache.ensure_revision_dir(&revision)?;
        self.hasher = SmartHasher::open(revision_dir, revision.clone(), self.hasher.num_workers())?;
        self.revision = revision;
        Ok(())
    }

    /// Drop the cached manifest and follow the log's head if it moved.
    ///
    /// Used after the versioned log was changed out of band. The caller
    /// decides whether to relink.
    pub fn force_reload(&mut self) -> ManifestResult<()> {
        self.file_cache.evict();
        if let Some(head) = self.log.head()? {
            if head != self.revision {
                info!(from = %self.revision.short(), to = %head.short(), "following new head");
                self.switch_revision(head)?;
            }
        }
        Ok(())
    }

    /// Materialize the manifest in the current revision directory.
    ///
    /// Directories are created and files linked from the object store where
    /// nothing is at their path yet. A local file that differs from its
    /// object is kept and left out of the rebuilt fast-hash index, so
    /// `status()` keeps reporting it as modified. Entries whose object is not
    /// local stay unmaterialized; only dangling symlinks are removed.
    pub fn link_revision(&mut self) -> ManifestResult<()> {
        let revision_dir = self.cache.ensure_revision_dir(&self.revision)?;
        let objects = self.cache.objects().clone();
        let rows: Vec<(String, ManifestEntry)> = self
            .map()?
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();

        let mut materialized = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        let mut kept = 0usize;
        for (key, entry) in rows {
            let path = revision_dir.join(&key);
            if is_dir_key(&key) {
                fs::create_dir_all(&path).map_err(|e| ManifestError::io(&path, e))?;
                materialized.push(key);
                continue;
            }
            let Some(hash) = entry.hash.filter(|h| objects.contains(h)) else {
                skipped += 1;
                continue;
            };
            // symlink_metadata sees dangling links, metadata does not.
            let present = fs::symlink_metadata(&path).is_ok();
            if !present || fs::metadata(&path).is_err() {
                objects.link_into(&hash, &path)?;
                materialized.push(key);
            } else if objects.is_linked(&hash, &path) {
                materialized.push(key);
            } else {
                debug!(key = %key, "keeping local changes over stored object");
                kept += 1;
            }
        }
        remove_dangling_symlinks(&revision_dir)?;

        self.hasher.clear()?;
        self.hasher.fast_hash(&materialized, true)?;
        debug!(
            revision = %self.revision.short(),
            linked = materialized.len(),
            unmaterialized = skipped,
            kept_local = kept,
            "linked revision"
        );
        Ok(())
    }
}

/// `{dataset_root}/manifest/manifest.json`
pub fn manifest_path(dataset_root: &Path) -> PathBuf {
    dataset_root.join(MANIFEST_DIR).join(MANIFEST_FILE)
}

/// Keys of everything under `revision_dir`, skipping bookkeeping files.
fn observe(revision_dir: &Path) -> ManifestResult<Vec<String>> {
    let mut keys = Vec::new();
    if !revision_dir.is_dir() {
        return Ok(keys);
    }
    for entry in WalkDir::new(revision_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            ManifestError::io(revision_dir, std::io::Error::other(e.to_string()))
        })?;
        let name = entry.file_name().to_string_lossy();
        if IGNORED_FILES.contains(&name.as_ref()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(revision_dir)
            .map_err(|_| ManifestError::NotFound(entry.path().display().to_string()))?;
        keys.push(key_from_relative(rel, entry.file_type().is_dir())?);
    }
    Ok(keys)
}

fn remove_dangling_symlinks(revision_dir: &Path) -> ManifestResult<()> {
    for entry in WalkDir::new(revision_dir).min_depth(1).into_iter().flatten() {
        if entry.path_is_symlink() && fs::metadata(entry.path()).is_err() {
            debug!(path = %entry.path().display(), "removing dangling symlink");
            fs::remove_file(entry.path()).map_err(|e| ManifestError::io(entry.path(), e))?;
        }
    }
    Ok(())
}
