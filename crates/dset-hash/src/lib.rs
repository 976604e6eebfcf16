//! Change detection for dataset revision directories.
//!
//! Two tiers:
//!
//! - **Fast hash** -- an `(mtime, size)` signature per key, persisted in a
//!   per-revision index so unchanged files are never re-read.
//! - **Full hash** -- BLAKE3 over the raw file bytes, the content-addressing
//!   key used by the object store.
//!
//! Full hashing runs on the blocking thread pool, bounded by
//! [`get_num_hashing_cpus`].

pub mod error;
pub mod hasher;
pub mod record;

pub use error::{HashError, HashResult};
pub use hasher::{get_num_hashing_cpus, hash_file, SmartHasher, FAST_HASH_INDEX_FILE};
pub use record::{FastHashIndex, FastHashRecord};
