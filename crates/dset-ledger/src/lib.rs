//! History and activity boundaries consumed by the dataset manifest.
//!
//! The manifest never talks to a version-control system directly. It needs
//! an opaque commit log ([`VersionedLog`]) and a sink for user-facing
//! activity records ([`ActivityStore`]). This crate defines both traits and
//! ships two implementations of each:
//!
//! - in-memory (`InMemoryVersionedLog`, `InMemoryActivityStore`) for tests
//! - file-backed (`FileVersionedLog`, `FileActivityStore`) under
//!   `{dataset_root}/.dset/`

pub mod error;
pub mod file;
pub mod memory;
pub mod records;
pub mod traits;

pub use error::{LedgerError, LedgerResult};
pub use file::{FileActivityStore, FileVersionedLog, LEDGER_DIR};
pub use memory::{InMemoryActivityStore, InMemoryVersionedLog};
pub use records::{
    ActivityAction, ActivityDetailRecord, ActivityDetailType, ActivityRecord, ActivityType,
    CommitEntry, LogStatus,
};
pub use traits::{ActivityStore, VersionedLog};
