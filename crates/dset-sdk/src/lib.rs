//! High-level API for dset datasets.
//!
//! [`Dataset`] wires a [`DatasetConfig`] to the manifest, the file-backed
//! history under `{dataset_root}/.dset`, and a remote backend chosen through
//! a [`BackendRegistry`].

pub mod config;
pub mod dataset;
pub mod error;

pub use config::{DatasetConfig, HashingConfig, SyncConfig, BEARER_TOKEN_ENV, ID_TOKEN_ENV};
pub use dataset::Dataset;
pub use error::{SdkError, SdkResult};

// Re-export key types
pub use dset_ledger::{ActivityRecord, CommitEntry};
pub use dset_manifest::{FileInfo, Manifest, ManifestError, StatusResult};
pub use dset_store::{PullObject, PushObject};
pub use dset_sync::{BackendConfig, BackendRegistry, Credentials, TransferResult};
pub use dset_types::{ContentHash, Revision};
