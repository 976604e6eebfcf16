use std::path::PathBuf;

use dset_types::ContentHash;

/// Errors from object store and cache directory operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object is not present in the local store.
    #[error("object not found: {0}")]
    ObjectNotFound(ContentHash),

    /// A push-queue line could not be parsed.
    #[error("malformed push queue line in {file}: {line}")]
    MalformedQueueLine { file: PathBuf, line: String },

    /// Replacing a push-queue file failed.
    #[error("failed to persist push queue: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// A path or revision did not parse.
    #[error(transparent)]
    Type(#[from] dset_types::TypeError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
