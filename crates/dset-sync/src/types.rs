use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Built-in backend variants, named the way they appear in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    GigantumObjectStore,
    LocalFilesystem,
    PublicS3Bucket,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GigantumObjectStore => "gigantum_object_store",
            Self::LocalFilesystem => "local_filesystem",
            Self::PublicS3Bucket => "public_s3_bucket",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive information about a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMetadata {
    pub kind: BackendKind,
    pub name: String,
    pub description: String,
    /// Whether objects can be uploaded.
    pub writable: bool,
    /// Whether the backend needs user credentials.
    pub requires_credentials: bool,
}

/// User identity for authenticated backends.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("bearer_token", &redact(&self.bearer_token))
            .field("id_token", &redact(&self.id_token))
            .finish()
    }
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        bearer_token: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            bearer_token: Some(bearer_token.into()),
            id_token: Some(id_token.into()),
        }
    }

    /// Names of the fields that are absent or empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        let mut missing = Vec::new();
        if blank(&self.username) {
            missing.push("username");
        }
        if blank(&self.bearer_token) {
            missing.push("bearer token");
        }
        if blank(&self.id_token) {
            missing.push("identity token");
        }
        missing
    }
}

/// Outcome of a batch transfer. Each object succeeds or fails on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult<T> {
    pub success: Vec<T>,
    pub failure: Vec<T>,
    pub message: String,
}

impl<T> Default for TransferResult<T> {
    fn default() -> Self {
        Self {
            success: Vec::new(),
            failure: Vec::new(),
            message: String::new(),
        }
    }
}

impl<T> TransferResult<T> {
    pub fn has_failures(&self) -> bool {
        !self.failure.is_empty()
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.failure.len()
    }

    /// Fold another batch into this one.
    pub fn merge(&mut self, other: TransferResult<T>) {
        self.success.extend(other.success);
        self.failure.extend(other.failure);
    }

    /// Set `message` to a one-line summary, e.g. `Pushed 2 of 3 objects (1 failed)`.
    pub fn summarize(&mut self, verb: &str) {
        let noun = if self.total() == 1 { "object" } else { "objects" };
        self.message = if self.has_failures() {
            format!(
                "{verb} {} of {} {noun} ({} failed)",
                self.success.len(),
                self.total(),
                self.failure.len()
            )
        } else {
            format!("{verb} {} {noun}", self.success.len())
        };
    }
}

/// Aggregated progress across concurrently running batches.
#[derive(Debug, Default)]
pub struct TransferProgress {
    bytes: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_report_missing_fields() {
        assert!(Credentials::new("u", "b", "i").missing().is_empty());
        let partial = Credentials {
            username: Some("u".into()),
            bearer_token: Some(String::new()),
            id_token: None,
        };
        assert_eq!(partial.missing(), vec!["bearer token", "identity token"]);
    }

    #[test]
    fn credentials_debug_hides_tokens() {
        let debug = format!("{:?}", Credentials::new("alice", "secret-b", "secret-i"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn transfer_result_summary() {
        let mut result = TransferResult {
            success: vec![1, 3],
            failure: vec![2],
            message: String::new(),
        };
        assert!(result.has_failures());
        result.summarize("Pushed");
        assert_eq!(result.message, "Pushed 2 of 3 objects (1 failed)");

        let mut ok: TransferResult<u8> = TransferResult::default();
        ok.merge(TransferResult {
            success: vec![7],
            ..Default::default()
        });
        ok.summarize("Pulled");
        assert_eq!(ok.message, "Pulled 1 object");
    }

    #[test]
    fn progress_counts() {
        let progress = TransferProgress::new();
        progress.record_success(10);
        progress.record_success(5);
        progress.record_failure();
        assert_eq!(progress.bytes(), 15);
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.failed(), 1);
    }

    #[test]
    fn kind_names_match_serde() {
        let json = serde_json::to_string(&BackendKind::PublicS3Bucket).unwrap();
        assert_eq!(json, format!("\"{}\"", BackendKind::PublicS3Bucket));
    }
}
