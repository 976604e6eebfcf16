use std::path::PathBuf;

use dset_types::Revision;

/// Errors produced by versioned-log and activity-store operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist history: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("revision not found: {0}")]
    RevisionNotFound(Revision),

    #[error("path is outside the dataset root: {0}")]
    InvalidPath(String),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
