//! Foundation types for dset, the dataset manifest and content-addressed
//! file cache.
//!
//! Every other dset crate depends on `dset-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- Full content digest of a file; the object-store key
//! - [`Revision`] -- Reference to one commit of the dataset's versioned log
//! - [`key`] -- Helpers for dataset-relative keys (`dir/` vs `dir/file`)

pub mod error;
pub mod hash;
pub mod key;
pub mod revision;

pub use error::TypeError;
pub use hash::ContentHash;
pub use key::{
    dir_key, is_dir_key, key_from_relative, natural_cmp, natural_sort_dedup, parent_key,
};
pub use revision::Revision;
