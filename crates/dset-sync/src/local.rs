//! Mirror directory on a local or shared filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dset_store::{PullObject, PushObject};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::{SyncError, SyncResult};
use crate::fsutil::copy_no_clobber;
use crate::types::{BackendKind, BackendMetadata, Credentials};

/// Objects live at `{root}/{namespace}/{dataset}/{object_id}`.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    dataset_dir: PathBuf,
}

impl LocalFilesystem {
    pub fn new(root: impl AsRef<Path>, namespace: &str, dataset: &str) -> Self {
        Self {
            dataset_dir: root.as_ref().join(namespace).join(dataset),
        }
    }

    pub fn remote_path(&self, object_id: &str) -> PathBuf {
        self.dataset_dir.join(object_id)
    }
}

#[async_trait]
impl StorageBackend for LocalFilesystem {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFilesystem
    }

    fn metadata(&self) -> BackendMetadata {
        BackendMetadata {
            kind: self.kind(),
            name: "Local filesystem".into(),
            description: format!("Mirror at {}", self.dataset_dir.display()),
            writable: true,
            requires_credentials: false,
        }
    }

    fn set_credentials(&mut self, _credentials: Credentials) {}

    async fn prepare_push(&self, _objects: &[PushObject]) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dataset_dir)
            .await
            .map_err(|e| SyncError::io(&self.dataset_dir, e))
    }

    async fn push_object(&self, object: &PushObject) -> SyncResult<u64> {
        let dest = self.remote_path(&object.object_id());
        let copied = copy_no_clobber(&object.object_path, &dest).await?;
        debug!(key = %object.dataset_path, bytes = copied, "mirrored object");
        Ok(copied)
    }

    async fn prepare_pull(&self, _objects: &[PullObject]) -> SyncResult<()> {
        if self.dataset_dir.is_dir() {
            Ok(())
        } else {
            Err(SyncError::io(
                &self.dataset_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "mirror directory missing"),
            ))
        }
    }

    async fn pull_object(&self, object: &PullObject) -> SyncResult<u64> {
        let src = self.remote_path(&object.object_id());
        copy_no_clobber(&src, &object.object_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferProgress;
    use dset_types::{ContentHash, Revision};
    use tempfile::TempDir;

    #[tokio::test]
    async fn push_then_pull_through_mirror() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let backend = LocalFilesystem::new(remote.path(), "alice", "images");

        let hash = ContentHash::of_bytes(b"pixels");
        let object_path = local.path().join("objects").join(hash.as_str());
        std::fs::create_dir_all(object_path.parent().unwrap()).unwrap();
        std::fs::write(&object_path, b"pixels").unwrap();
        let push = PushObject {
            object_path: object_path.clone(),
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "img.png".into(),
        };

        backend.prepare_push(&[push.clone()]).await.unwrap();
        let progress = TransferProgress::new();
        let result = backend.push_objects(&[push], &progress).await;
        assert!(!result.has_failures());
        assert_eq!(progress.bytes(), 6);
        assert!(backend.remote_path(hash.as_str()).is_file());

        std::fs::remove_file(&object_path).unwrap();
        let pull = PullObject {
            object_path: object_path.clone(),
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "img.png".into(),
        };
        backend.prepare_pull(&[pull.clone()]).await.unwrap();
        assert_eq!(backend.pull_object(&pull).await.unwrap(), 6);
        assert_eq!(std::fs::read(&object_path).unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn pull_of_unknown_object_fails_alone() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let backend = LocalFilesystem::new(remote.path(), "alice", "images");
        let missing = PullObject {
            object_path: local.path().join("deadbeefdeadbeef00"),
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "gone.bin".into(),
        };
        let result = backend
            .pull_objects(&[missing], &TransferProgress::new())
            .await;
        assert_eq!(result.failure.len(), 1);
        assert_eq!(result.message, "Pulled 0 of 1 object (1 failed)");
    }
}
