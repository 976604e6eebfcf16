use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// `prepare_push`/`prepare_pull` found no usable credentials.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("giving up on {object} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        object: String,
        attempts: usize,
        last_error: String,
    },

    #[error("downloaded bytes for {object} hash to {actual}")]
    IntegrityMismatch { object: String, actual: String },

    #[error("backend {0} is read-only")]
    ReadOnly(String),

    #[error("no backend registered under {0}")]
    UnknownBackend(String),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] dset_store::StoreError),

    #[error("transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
