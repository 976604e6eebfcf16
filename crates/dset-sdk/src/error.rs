use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("dataset not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("dataset already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] dset_manifest::ManifestError),

    #[error("sync error: {0}")]
    Sync(#[from] dset_sync::SyncError),

    #[error("ledger error: {0}")]
    Ledger(#[from] dset_ledger::LedgerError),

    #[error("store error: {0}")]
    Store(#[from] dset_store::StoreError),

    #[error("invalid revision: {0}")]
    Type(#[from] dset_types::TypeError),
}

pub type SdkResult<T> = Result<T, SdkError>;
