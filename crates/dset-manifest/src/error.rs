//! Error types for the manifest crate.

use std::path::PathBuf;

/// Errors from manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// One or more files could not be fully hashed. The update is aborted.
    #[error("failed to hash {} file(s): {}", .0.len(), .0.join(", "))]
    HashFailed(Vec<String>),

    /// Pagination arguments out of range.
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    /// The path is neither present locally nor in the manifest.
    #[error("path not found: {0}")]
    NotFound(String),

    /// The directory already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The parent directory of a new directory does not exist.
    #[error("parent directory does not exist: {0}")]
    ParentMissing(String),

    /// A move was requested that cannot be performed.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// The versioned log has no commit to anchor a revision directory.
    #[error("dataset has no revision; create it first")]
    NoRevision,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist manifest: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Hash(#[from] dset_hash::HashError),

    #[error(transparent)]
    Store(#[from] dset_store::StoreError),

    #[error(transparent)]
    Ledger(#[from] dset_ledger::LedgerError),

    #[error(transparent)]
    Type(#[from] dset_types::TypeError),
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for manifest results.
pub type ManifestResult<T> = Result<T, ManifestError>;
