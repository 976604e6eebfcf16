//! Managed object service: presigned URLs per object.
//!
//! For each object the service API is asked for a presigned URL
//! (`PUT` for upload, `GET` for download) at
//! `{endpoint}/{namespace}/{dataset}/{object_id}`; the bytes then go
//! straight to that URL.

use async_trait::async_trait;
use dset_store::{PullObject, PushObject};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, Method, StatusCode};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::error::{SyncError, SyncResult};
use crate::fsutil::stream_into_object;
use crate::retry::RetryPolicy;
use crate::types::{BackendKind, BackendMetadata, Credentials};

const IDENTITY_HEADER: &str = "Identity";

/// Body returned by the URL-generation API.
#[derive(Debug, Deserialize)]
struct PresignedUrl {
    presigned_url: String,
    #[serde(default)]
    key_id: Option<String>,
}

pub struct GigantumObjectStore {
    endpoint: String,
    namespace: String,
    dataset: String,
    retry: RetryPolicy,
    credentials: Credentials,
    client: Client,
}

impl std::fmt::Debug for GigantumObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GigantumObjectStore")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("dataset", &self.dataset)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl GigantumObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        namespace: impl Into<String>,
        dataset: impl Into<String>,
        retry: RetryPolicy,
    ) -> SyncResult<Self> {
        let client = Client::builder().timeout(retry.timeout()).build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            dataset: dataset.into(),
            retry,
            credentials: Credentials::default(),
            client,
        })
    }

    fn api_url(&self, object_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint, self.namespace, self.dataset, object_id
        )
    }

    fn require_credentials(&self) -> SyncResult<(&str, &str)> {
        let missing = self.credentials.missing();
        if !missing.is_empty() {
            return Err(SyncError::MissingCredentials(missing.join(", ")));
        }
        match (&self.credentials.bearer_token, &self.credentials.id_token) {
            (Some(bearer), Some(id)) => Ok((bearer.as_str(), id.as_str())),
            _ => Err(SyncError::MissingCredentials("bearer token".into())),
        }
    }

    /// Ask the API for a presigned URL, retrying non-200 answers.
    async fn gen_url(&self, method: Method, object_id: &str) -> SyncResult<String> {
        let (bearer, identity) = self.require_credentials()?;
        let url = self.api_url(object_id);
        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let response = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(bearer)
                .header(IDENTITY_HEADER, identity)
                .send()
                .await;
            match response {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    let body: PresignedUrl = resp.json().await?;
                    debug!(object = %object_id, key_id = ?body.key_id, "got presigned url");
                    return Ok(body.presigned_url);
                }
                Ok(resp) => last_error = format!("HTTP {}", resp.status()),
                Err(e) => last_error = e.to_string(),
            }
            if attempt < attempts {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    object = %object_id,
                    attempt,
                    error = %last_error,
                    delay_ms = delay.as_millis() as u64,
                    "presigned url request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(SyncError::RetriesExhausted {
            object: object_id.to_string(),
            attempts,
            last_error,
        })
    }
}

fn remote_error(status: StatusCode, what: &str) -> SyncError {
    SyncError::Remote {
        status: status.as_u16(),
        message: what.to_string(),
    }
}

#[async_trait]
impl StorageBackend for GigantumObjectStore {
    fn kind(&self) -> BackendKind {
        BackendKind::GigantumObjectStore
    }

    fn metadata(&self) -> BackendMetadata {
        BackendMetadata {
            kind: self.kind(),
            name: "Gigantum Cloud".into(),
            description: "Managed object storage with presigned uploads and downloads".into(),
            writable: true,
            requires_credentials: true,
        }
    }

    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    async fn prepare_push(&self, objects: &[PushObject]) -> SyncResult<()> {
        self.require_credentials()?;
        debug!(count = objects.len(), "prepared push");
        Ok(())
    }

    async fn push_object(&self, object: &PushObject) -> SyncResult<u64> {
        let object_id = object.object_id();
        let url = self.gen_url(Method::PUT, &object_id).await?;
        let file = tokio::fs::File::open(&object.object_path)
            .await
            .map_err(|e| SyncError::io(&object.object_path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| SyncError::io(&object.object_path, e))?
            .len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        let resp = self
            .client
            .put(&url)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp.status(), "upload to presigned url failed"));
        }
        debug!(object = %object_id, bytes = len, "pushed object");
        Ok(len)
    }

    async fn prepare_pull(&self, objects: &[PullObject]) -> SyncResult<()> {
        self.require_credentials()?;
        debug!(count = objects.len(), "prepared pull");
        Ok(())
    }

    async fn pull_object(&self, object: &PullObject) -> SyncResult<u64> {
        if object.object_path.is_file() {
            return Ok(0);
        }
        let object_id = object.object_id();
        let url = self.gen_url(Method::GET, &object_id).await?;
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp.status(), "download from presigned url failed"));
        }
        stream_into_object(resp, &object.object_path, &object_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::put;
    use axum::{Json, Router};
    use dset_types::{ContentHash, Revision};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeService {
        base: String,
        /// Number of URL requests to refuse before answering.
        refuse: AtomicUsize,
        url_requests: AtomicUsize,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        content_lengths: Mutex<HashMap<String, u64>>,
    }

    async fn gen_url(
        State(svc): State<Arc<FakeService>>,
        Path((_ns, _ds, object_id)): Path<(String, String, String)>,
        headers: HeaderMap,
    ) -> Response {
        svc.url_requests.fetch_add(1, Ordering::SeqCst);
        if headers.get("authorization").is_none() || headers.get(IDENTITY_HEADER).is_none() {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        let refused = svc
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Json(serde_json::json!({
            "presigned_url": format!("{}/blob/{object_id}", svc.base),
            "namespace": "ns",
            "obj_id": object_id,
            "dataset": "ds",
        }))
        .into_response()
    }

    async fn upload(
        State(svc): State<Arc<FakeService>>,
        Path(object_id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> axum::http::StatusCode {
        if let Some(len) = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
        {
            svc.content_lengths.lock().unwrap().insert(object_id.clone(), len);
        }
        svc.blobs.lock().unwrap().insert(object_id, body.to_vec());
        axum::http::StatusCode::OK
    }

    async fn download(State(svc): State<Arc<FakeService>>, Path(object_id): Path<String>) -> Response {
        match svc.blobs.lock().unwrap().get(&object_id) {
            Some(bytes) => bytes.clone().into_response(),
            None => axum::http::StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn serve(refuse: usize) -> (Arc<FakeService>, SocketAddr) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let svc = Arc::new(FakeService {
            base: format!("http://{addr}"),
            refuse: AtomicUsize::new(refuse),
            ..Default::default()
        });
        let app = Router::new()
            .route("/api/:namespace/:dataset/:object_id", put(gen_url).get(gen_url))
            .route("/blob/:object_id", put(upload).get(download))
            .with_state(svc.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (svc, addr)
    }

    fn backend(addr: SocketAddr) -> GigantumObjectStore {
        let retry = RetryPolicy {
            base_backoff_ms: 1,
            ..Default::default()
        };
        let mut store = GigantumObjectStore::new(format!("http://{addr}/api"), "ns", "ds", retry).unwrap();
        store.set_credentials(Credentials::new("alice", "bearer", "identity"));
        store
    }

    fn object_file(dir: &TempDir, content: &[u8]) -> (PathBuf, ContentHash) {
        let hash = ContentHash::of_bytes(content);
        let path = dir.path().join(hash.as_str());
        std::fs::write(&path, content).unwrap();
        (path, hash)
    }

    #[tokio::test]
    async fn prepare_requires_all_credentials() {
        let mut store =
            GigantumObjectStore::new("http://127.0.0.1:9", "ns", "ds", RetryPolicy::default()).unwrap();
        let err = store.prepare_push(&[]).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingCredentials(_)));

        store.set_credentials(Credentials {
            username: Some("alice".into()),
            bearer_token: Some("b".into()),
            id_token: None,
        });
        let err = store.prepare_pull(&[]).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingCredentials(m) if m.contains("identity")));
    }

    #[tokio::test]
    async fn push_retries_then_uploads() {
        let (svc, addr) = serve(2).await;
        let store = backend(addr);
        let dir = TempDir::new().unwrap();
        let (path, hash) = object_file(&dir, b"payload");

        let object = PushObject {
            object_path: path,
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "a.txt".into(),
        };
        assert_eq!(store.push_object(&object).await.unwrap(), 7);
        assert_eq!(svc.url_requests.load(Ordering::SeqCst), 3);
        assert_eq!(svc.blobs.lock().unwrap()[hash.as_str()], b"payload");
    }

    #[tokio::test]
    async fn push_streams_large_object_with_length() {
        let (svc, addr) = serve(0).await;
        let store = backend(addr);
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let (path, hash) = object_file(&dir, &content);

        let object = PushObject {
            object_path: path,
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "big.bin".into(),
        };
        assert_eq!(store.push_object(&object).await.unwrap(), 300_000);
        assert_eq!(svc.content_lengths.lock().unwrap()[hash.as_str()], 300_000);
        assert_eq!(svc.blobs.lock().unwrap()[hash.as_str()], content);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let (svc, addr) = serve(usize::MAX).await;
        let store = backend(addr);
        let dir = TempDir::new().unwrap();
        let (path, _) = object_file(&dir, b"payload");
        let object = PushObject {
            object_path: path,
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "a.txt".into(),
        };

        let err = store.push_object(&object).await.unwrap_err();
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 5, .. }));
        assert_eq!(svc.url_requests.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn pull_streams_and_verifies() {
        let (svc, addr) = serve(0).await;
        let store = backend(addr);
        let hash = ContentHash::of_bytes(b"remote bytes");
        svc.blobs
            .lock()
            .unwrap()
            .insert(hash.as_str().to_string(), b"remote bytes".to_vec());

        let dir = TempDir::new().unwrap();
        let object = PullObject {
            object_path: dir.path().join("objects/x").join(hash.as_str()),
            revision: Revision::parse("abc").unwrap(),
            dataset_path: "r.txt".into(),
        };
        assert_eq!(store.pull_object(&object).await.unwrap(), 12);
        assert_eq!(std::fs::read(&object.object_path).unwrap(), b"remote bytes");

        // Bytes that do not match the object id are rejected.
        let wrong = ContentHash::of_bytes(b"something else");
        svc.blobs
            .lock()
            .unwrap()
            .insert(wrong.as_str().to_string(), b"tampered".to_vec());
        let bad = PullObject {
            object_path: dir.path().join("objects/y").join(wrong.as_str()),
            ..object.clone()
        };
        let err = store.pull_object(&bad).await.unwrap_err();
        assert!(matches!(err, SyncError::IntegrityMismatch { .. }));
        assert!(!bad.object_path.exists());
    }
}
