//! Read-only public bucket, addressed by dataset path.

use async_trait::async_trait;
use dset_store::{PullObject, PushObject};
use reqwest::Client;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::{SyncError, SyncResult};
use crate::fsutil::stream_into_object;
use crate::retry::RetryPolicy;
use crate::types::{BackendKind, BackendMetadata, Credentials};

/// Files are fetched with unsigned GETs from `{bucket_url}/{prefix}/{key}`.
#[derive(Debug)]
pub struct PublicS3Bucket {
    bucket_url: String,
    prefix: Option<String>,
    client: Client,
}

impl PublicS3Bucket {
    pub fn new(
        bucket_url: impl Into<String>,
        prefix: Option<String>,
        retry: &RetryPolicy,
    ) -> SyncResult<Self> {
        let client = Client::builder().timeout(retry.timeout()).build()?;
        Ok(Self {
            bucket_url: bucket_url.into().trim_end_matches('/').to_string(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            client,
        })
    }

    pub fn object_url(&self, dataset_path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{prefix}/{dataset_path}", self.bucket_url),
            None => format!("{}/{dataset_path}", self.bucket_url),
        }
    }
}

#[async_trait]
impl StorageBackend for PublicS3Bucket {
    fn kind(&self) -> BackendKind {
        BackendKind::PublicS3Bucket
    }

    fn metadata(&self) -> BackendMetadata {
        BackendMetadata {
            kind: self.kind(),
            name: "Public S3 bucket".into(),
            description: format!("Read-only files from {}", self.bucket_url),
            writable: false,
            requires_credentials: false,
        }
    }

    fn set_credentials(&mut self, _credentials: Credentials) {}

    async fn prepare_push(&self, _objects: &[PushObject]) -> SyncResult<()> {
        Err(SyncError::ReadOnly(self.kind().to_string()))
    }

    async fn push_object(&self, _object: &PushObject) -> SyncResult<u64> {
        Err(SyncError::ReadOnly(self.kind().to_string()))
    }

    async fn prepare_pull(&self, objects: &[PullObject]) -> SyncResult<()> {
        debug!(count = objects.len(), bucket = %self.bucket_url, "prepared pull");
        Ok(())
    }

    async fn pull_object(&self, object: &PullObject) -> SyncResult<u64> {
        if object.object_path.is_file() {
            return Ok(0);
        }
        let resp = self
            .client
            .get(self.object_url(&object.dataset_path))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SyncError::Remote {
                status: resp.status().as_u16(),
                message: format!("GET {} failed", object.dataset_path),
            });
        }
        stream_into_object(resp, &object.object_path, &object.object_id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use dset_types::{ContentHash, Revision};
    use tempfile::TempDir;

    #[test]
    fn object_url_joins_prefix() {
        let retry = RetryPolicy::default();
        let bucket = PublicS3Bucket::new("https://b.example/", Some("/data/".into()), &retry).unwrap();
        assert_eq!(bucket.object_url("a/b.csv"), "https://b.example/data/a/b.csv");
        let bare = PublicS3Bucket::new("https://b.example", None, &retry).unwrap();
        assert_eq!(bare.object_url("x"), "https://b.example/x");
    }

    #[tokio::test]
    async fn push_is_refused() {
        let bucket = PublicS3Bucket::new("http://127.0.0.1:9", None, &RetryPolicy::default()).unwrap();
        assert!(matches!(
            bucket.prepare_push(&[]).await,
            Err(SyncError::ReadOnly(_))
        ));
        assert!(!bucket.metadata().writable);
    }

    #[tokio::test]
    async fn pulls_by_dataset_path() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/pub/data/table.csv", get(|| async { "a,b\n1,2\n" }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let bucket = PublicS3Bucket::new(
            format!("http://{addr}/pub"),
            Some("data".into()),
            &RetryPolicy::default(),
        )
        .unwrap();
        let dir = TempDir::new().unwrap();
        let hash = ContentHash::of_bytes(b"a,b\n1,2\n");
        let object = PullObject {
            object_path: dir.path().join(hash.as_str()),
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "table.csv".into(),
        };
        assert_eq!(bucket.pull_object(&object).await.unwrap(), 8);

        let missing = PullObject {
            dataset_path: "nope.csv".into(),
            object_path: dir.path().join("0000000000000000"),
            ..object
        };
        assert!(matches!(
            bucket.pull_object(&missing).await,
            Err(SyncError::Remote { status: 404, .. })
        ));
    }
}
