//! # dset-manifest
//!
//! The dataset manifest: an ordered `key -> (hash, size, mtime)` mapping for
//! the current revision, kept in step with the revision directory.
//!
//! [`Manifest`] drives the full cycle: classify local changes
//! ([`Manifest::status`]), hash and promote them into the object store
//! ([`Manifest::update`]), and commit them as a new revision whose directory
//! is relinked from the store ([`Manifest::sweep_all_changes`]).

pub mod activity;
pub mod cache;
pub mod entry;
pub mod error;
pub mod manifest;
pub mod manifest_file;

pub use cache::ManifestFileCache;
pub use entry::{FileInfo, ManifestEntry, StatusResult};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{manifest_path, Manifest, ManifestOptions, MANIFEST_DIR, MANIFEST_FILE};
pub use manifest_file::ManifestMap;
