//! Batched, concurrent push and pull against one backend.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use dset_store::{CacheManager, PullObject, PushObject};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::error::SyncResult;
use crate::types::{TransferProgress, TransferResult};

/// Batch sizing and concurrency for transfers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub max_batch_bytes: u64,
    pub max_batch_objects: usize,
    pub max_concurrent_batches: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_batch_bytes: 4 * 1024 * 1024 * 1024,
            max_batch_objects: 1000,
            max_concurrent_batches: 4,
        }
    }
}

/// A group of objects uploaded by one job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushBatch {
    pub objects: Vec<PushObject>,
    pub total_bytes: u64,
}

pub struct IoManager {
    backend: Arc<dyn StorageBackend>,
    cache: CacheManager,
    options: SyncOptions,
    progress: Arc<TransferProgress>,
}

impl std::fmt::Debug for IoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoManager")
            .field("backend", &self.backend.kind())
            .field("cache_root", &self.cache.cache_root())
            .field("options", &self.options)
            .finish()
    }
}

impl IoManager {
    pub fn new(backend: Arc<dyn StorageBackend>, cache: CacheManager, options: SyncOptions) -> Self {
        Self {
            backend,
            cache,
            options,
            progress: Arc::new(TransferProgress::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Counters shared by every batch this manager runs.
    pub fn progress(&self) -> &Arc<TransferProgress> {
        &self.progress
    }

    /// Queued objects across all revisions, one entry per object file.
    pub fn objects_to_push(&self) -> SyncResult<Vec<PushObject>> {
        let mut seen = HashSet::new();
        let objects: Vec<PushObject> = self
            .cache
            .push_queue()
            .load_all()?
            .into_iter()
            .filter(|o| seen.insert(o.object_path.clone()))
            .collect();
        Ok(objects)
    }

    /// Group the queued objects into bounded batches.
    ///
    /// Returns `(batches, total_bytes, file_count)`. A single object larger
    /// than `max_batch_bytes` gets a batch of its own.
    pub fn compute_push_batches(&self) -> SyncResult<(Vec<PushBatch>, u64, usize)> {
        let objects = self.objects_to_push()?;
        let max_objects = self.options.max_batch_objects.max(1);
        let mut batches = Vec::new();
        let mut current = PushBatch::default();
        let mut total_bytes = 0u64;
        let file_count = objects.len();

        for object in objects {
            let size = std::fs::metadata(&object.object_path)
                .map(|m| m.len())
                .unwrap_or(0);
            let full = !current.objects.is_empty()
                && (current.objects.len() >= max_objects
                    || current.total_bytes.saturating_add(size) > self.options.max_batch_bytes);
            if full {
                batches.push(std::mem::take(&mut current));
            }
            current.total_bytes += size;
            current.objects.push(object);
            total_bytes += size;
        }
        if !current.objects.is_empty() {
            batches.push(current);
        }
        debug!(batches = batches.len(), total_bytes, file_count, "computed push batches");
        Ok((batches, total_bytes, file_count))
    }

    /// Push one batch. Objects succeed or fail independently.
    pub async fn push_objects(&self, objects: &[PushObject]) -> TransferResult<PushObject> {
        self.backend.push_objects(objects, &self.progress).await
    }

    /// Push everything queued and reconcile the queue files.
    ///
    /// Batches run concurrently up to `max_concurrent_batches`. Afterwards a
    /// revision's queue file is removed when every entry in it was pushed,
    /// and otherwise rewritten to hold exactly the entries that were not.
    pub async fn push_all(&self) -> SyncResult<TransferResult<PushObject>> {
        let (batches, total_bytes, file_count) = self.compute_push_batches()?;
        let mut result = TransferResult::default();
        if batches.is_empty() {
            result.summarize("Pushed");
            return Ok(result);
        }

        let all: Vec<PushObject> = batches.iter().flat_map(|b| b.objects.clone()).collect();
        self.backend.prepare_push(&all).await?;
        info!(
            batches = batches.len(),
            files = file_count,
            bytes = total_bytes,
            "pushing objects"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_batches.max(1)));
        let mut tasks = JoinSet::new();
        for (idx, batch) in batches.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let progress = Arc::clone(&self.progress);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = backend.push_objects(&batch.objects, &progress).await;
                debug!(batch = idx, "{}", outcome.message);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => result.merge(outcome),
                Err(e) => warn!(error = %e, "push batch task failed"),
            }
        }
        result.summarize("Pushed");
        self.backend.finalize_push(&result).await?;

        let pushed: HashSet<PathBuf> = result.success.iter().map(|o| o.object_path.clone()).collect();
        self.reconcile_queue(&pushed)?;
        Ok(result)
    }

    fn reconcile_queue(&self, pushed: &HashSet<PathBuf>) -> SyncResult<()> {
        let queue = self.cache.push_queue();
        for revision in queue.revisions()? {
            let entries = queue.load(&revision)?;
            let remaining: Vec<PushObject> = entries
                .into_iter()
                .filter(|o| !pushed.contains(&o.object_path))
                .collect();
            if remaining.is_empty() {
                queue.remove(&revision)?;
            } else {
                warn!(
                    revision = %revision.short(),
                    remaining = remaining.len(),
                    "objects left queued for a later push"
                );
                queue.rewrite(&revision, &remaining)?;
            }
        }
        Ok(())
    }

    /// Download objects into the local store, batches running concurrently.
    pub async fn pull_objects(&self, objects: &[PullObject]) -> SyncResult<TransferResult<PullObject>> {
        let mut result = TransferResult::default();
        if objects.is_empty() {
            result.summarize("Pulled");
            return Ok(result);
        }
        self.backend.prepare_pull(objects).await?;

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_batches.max(1)));
        let mut tasks = JoinSet::new();
        for chunk in objects.chunks(self.options.max_batch_objects.max(1)) {
            let chunk = chunk.to_vec();
            let backend = Arc::clone(&self.backend);
            let progress = Arc::clone(&self.progress);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                backend.pull_objects(&chunk, &progress).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => result.merge(outcome),
                Err(e) => warn!(error = %e, "pull batch task failed"),
            }
        }
        result.summarize("Pulled");
        self.backend.finalize_pull(&result).await?;
        Ok(result)
    }
}
