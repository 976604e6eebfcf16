//! Remote synchronization for dset datasets.
//!
//! Objects queued by the manifest are uploaded in bounded batches to a
//! [`StorageBackend`]; missing objects are pulled back into the local store.
//! A failed object never aborts its siblings: it stays queued and is retried
//! on the next push.

pub mod backend;
pub mod error;
mod fsutil;
pub mod gigantum;
pub mod io_manager;
pub mod local;
pub mod registry;
pub mod retry;
pub mod s3;
pub mod types;

pub use backend::StorageBackend;
pub use error::{SyncError, SyncResult};
pub use gigantum::GigantumObjectStore;
pub use io_manager::{IoManager, PushBatch, SyncOptions};
pub use local::LocalFilesystem;
pub use registry::{BackendConfig, BackendContext, BackendFactory, BackendRegistry};
pub use retry::RetryPolicy;
pub use s3::PublicS3Bucket;
pub use types::{
    BackendKind, BackendMetadata, Credentials, TransferProgress, TransferResult,
};
