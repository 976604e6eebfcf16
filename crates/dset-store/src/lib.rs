//! Local content-addressed object storage for dset.
//!
//! Objects are immutable files named by their full content hash and sharded
//! two levels deep:
//!
//! ```text
//! {cache_root}/objects/<hash[0:8]>/<hash[8:16]>/<hash>
//! ```
//!
//! Revision working directories (`{cache_root}/{revision}`) hold hard links
//! into the store, so a file shared by many revisions occupies disk once.
//!
//! # Key Types
//!
//! - [`ObjectStore`] -- promotion (move + relink) and materialization
//! - [`CacheManager`] -- owns the cache root and its revision directories
//! - [`PushQueue`] -- per-revision files of objects awaiting upload
//! - [`PushObject`] / [`PullObject`] -- transfer units
//!
//! # Design Rules
//!
//! 1. An object is never modified after it is created; re-adding is a no-op.
//! 2. "Already exists" is success for every writer.
//! 3. Objects are never garbage collected.

pub mod cache;
pub mod error;
pub mod object_store;
pub mod push_queue;
pub mod transfer;

pub use cache::{CacheManager, OBJECTS_DIR};
pub use error::{StoreError, StoreResult};
pub use object_store::{LinkKind, ObjectStore, PromoteOutcome};
pub use push_queue::{PushQueue, PUSH_QUEUE_DIR};
pub use transfer::{PullObject, PushObject};
