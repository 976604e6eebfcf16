use async_trait::async_trait;
use dset_store::{PullObject, PushObject};
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::types::{BackendKind, BackendMetadata, Credentials, TransferProgress, TransferResult};

/// A remote content-addressed store that objects are pushed to and pulled from.
///
/// `push_object`/`pull_object` move one object and return the number of bytes
/// transferred. The batch methods never fail as a whole: each object lands in
/// either `success` or `failure`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn metadata(&self) -> BackendMetadata;

    fn set_credentials(&mut self, credentials: Credentials);

    /// Validate that a push can start (credentials, writability).
    async fn prepare_push(&self, objects: &[PushObject]) -> SyncResult<()>;

    async fn push_object(&self, object: &PushObject) -> SyncResult<u64>;

    async fn push_objects(
        &self,
        objects: &[PushObject],
        progress: &TransferProgress,
    ) -> TransferResult<PushObject> {
        let mut result = TransferResult::default();
        for object in objects {
            match self.push_object(object).await {
                Ok(bytes) => {
                    progress.record_success(bytes);
                    result.success.push(object.clone());
                }
                Err(e) => {
                    warn!(key = %object.dataset_path, error = %e, "failed to push object");
                    progress.record_failure();
                    result.failure.push(object.clone());
                }
            }
        }
        result.summarize("Pushed");
        result
    }

    async fn finalize_push(&self, result: &TransferResult<PushObject>) -> SyncResult<()> {
        info!(backend = %self.kind(), "{}", result.message);
        Ok(())
    }

    async fn prepare_pull(&self, objects: &[PullObject]) -> SyncResult<()>;

    async fn pull_object(&self, object: &PullObject) -> SyncResult<u64>;

    async fn pull_objects(
        &self,
        objects: &[PullObject],
        progress: &TransferProgress,
    ) -> TransferResult<PullObject> {
        let mut result = TransferResult::default();
        for object in objects {
            match self.pull_object(object).await {
                Ok(bytes) => {
                    progress.record_success(bytes);
                    result.success.push(object.clone());
                }
                Err(e) => {
                    warn!(key = %object.dataset_path, error = %e, "failed to pull object");
                    progress.record_failure();
                    result.failure.push(object.clone());
                }
            }
        }
        result.summarize("Pulled");
        result
    }

    async fn finalize_pull(&self, result: &TransferResult<PullObject>) -> SyncResult<()> {
        info!(backend = %self.kind(), "{}", result.message);
        Ok(())
    }
}
