//! Error types for the hash crate.

use std::path::PathBuf;

/// Errors from fast-hash index and hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Reading file metadata or content failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted fast-hash index could not be parsed or written.
    #[error("fast-hash index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisting the index to disk failed.
    #[error("failed to persist fast-hash index: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// A blocking hash task panicked or was cancelled.
    #[error("hash task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HashError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for hash results.
pub type HashResult<T> = Result<T, HashError>;
