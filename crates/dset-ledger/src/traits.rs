use dset_types::Revision;

use crate::error::LedgerResult;
use crate::records::{ActivityRecord, CommitEntry, LogStatus};

/// Opaque commit log of a dataset's tracked files.
///
/// Paths are relative to the dataset root. The manifest only needs to stage,
/// commit and read history; branching and merging are out of scope.
pub trait VersionedLog: Send + Sync {
    /// Stage one path for the next commit.
    fn add(&self, path: &str) -> LedgerResult<()>;

    /// Stage every tracked file under the dataset root.
    fn add_all(&self) -> LedgerResult<()>;

    /// Commit the staged set and return the new head.
    fn commit(&self, message: &str) -> LedgerResult<Revision>;

    fn head(&self) -> LedgerResult<Option<Revision>>;

    /// Commits newest first, at most `limit` when given.
    fn log(&self, limit: Option<usize>) -> LedgerResult<Vec<CommitEntry>>;

    fn log_entry(&self, revision: &Revision) -> LedgerResult<CommitEntry>;

    /// Working-tree state relative to the head commit.
    fn status(&self) -> LedgerResult<LogStatus>;
}

/// Sink for user-facing activity records.
pub trait ActivityStore: Send + Sync {
    /// Persist a record and return it as stored.
    fn create_activity_record(&self, record: ActivityRecord) -> LedgerResult<ActivityRecord>;

    /// Records newest first, at most `limit` when given.
    fn records(&self, limit: Option<usize>) -> LedgerResult<Vec<ActivityRecord>>;
}
