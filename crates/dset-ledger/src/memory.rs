use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use dset_types::Revision;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::records::{ActivityRecord, CommitEntry, LogStatus};
use crate::traits::{ActivityStore, VersionedLog};

/// In-memory versioned log for tests and embedding.
///
/// Staged paths are recorded by name only; there is no working tree to
/// digest, so `status()` reports just the staged set.
#[derive(Default)]
pub struct InMemoryVersionedLog {
    inner: RwLock<LogState>,
}

#[derive(Default)]
struct LogState {
    commits: Vec<CommitEntry>,
    staged: BTreeSet<String>,
}

impl InMemoryVersionedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commits
            .len()
    }
}

impl VersionedLog for InMemoryVersionedLog {
    fn add(&self, path: &str) -> LedgerResult<()> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.staged.insert(path.to_string());
        Ok(())
    }

    fn add_all(&self) -> LedgerResult<()> {
        // No working tree; only explicitly added paths are tracked.
        Ok(())
    }

    fn commit(&self, message: &str) -> LedgerResult<Revision> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let parent = state.commits.last().map(|c| c.revision.clone());
        let mut files = state
            .commits
            .last()
            .map(|c| c.files.clone())
            .unwrap_or_default();
        for path in std::mem::take(&mut state.staged) {
            files.insert(path, String::new());
        }

        let timestamp = Utc::now();
        let revision = CommitEntry::derive_revision(parent.as_ref(), message, &timestamp, &files);
        debug!(revision = %revision, "in-memory commit");
        state.commits.push(CommitEntry {
            revision: revision.clone(),
            parent,
            message: message.to_string(),
            timestamp,
            files,
        });
        Ok(revision)
    }

    fn head(&self) -> LedgerResult<Option<Revision>> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.commits.last().map(|c| c.revision.clone()))
    }

    fn log(&self, limit: Option<usize>) -> LedgerResult<Vec<CommitEntry>> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let iter = state.commits.iter().rev().cloned();
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    fn log_entry(&self, revision: &Revision) -> LedgerResult<CommitEntry> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .commits
            .iter()
            .find(|c| &c.revision == revision)
            .cloned()
            .ok_or_else(|| LedgerError::RevisionNotFound(revision.clone()))
    }

    fn status(&self) -> LedgerResult<LogStatus> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(LogStatus {
            staged: state.staged.iter().cloned().collect(),
            ..Default::default()
        })
    }
}

/// In-memory activity store for tests and embedding.
#[derive(Default)]
pub struct InMemoryActivityStore {
    records: RwLock<Vec<ActivityRecord>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityStore for InMemoryActivityStore {
    fn create_activity_record(&self, record: ActivityRecord) -> LedgerResult<ActivityRecord> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push(record.clone());
        Ok(record)
    }

    fn records(&self, limit: Option<usize>) -> LedgerResult<Vec<ActivityRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let iter = records.iter().rev().cloned();
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ActivityType;

    #[test]
    fn commits_chain_to_parent() {
        let log = InMemoryVersionedLog::new();
        assert_eq!(log.head().unwrap(), None);

        log.add("manifest/manifest.json").unwrap();
        let first = log.commit("first").unwrap();
        log.add_all().unwrap();
        let second = log.commit("second").unwrap();

        assert_ne!(first, second);
        assert_eq!(log.head().unwrap(), Some(second.clone()));
        let entry = log.log_entry(&second).unwrap();
        assert_eq!(entry.parent, Some(first));
        assert!(entry.files.contains_key("manifest/manifest.json"));
        assert_eq!(log.commit_count(), 2);
    }

    #[test]
    fn log_is_newest_first_and_limited() {
        let log = InMemoryVersionedLog::new();
        for i in 0..3 {
            log.commit(&format!("c{i}")).unwrap();
        }
        let entries = log.log(Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "c2");
        assert_eq!(entries[1].message, "c1");
    }

    #[test]
    fn unknown_revision_errors() {
        let log = InMemoryVersionedLog::new();
        let err = log.log_entry(&Revision::parse("dead").unwrap()).unwrap_err();
        assert!(matches!(err, LedgerError::RevisionNotFound(_)));
    }

    #[test]
    fn status_reports_staged_until_commit() {
        let log = InMemoryVersionedLog::new();
        log.add("a").unwrap();
        assert_eq!(log.status().unwrap().staged, vec!["a"]);
        log.commit("c").unwrap();
        assert!(log.status().unwrap().is_clean());
    }

    #[test]
    fn activity_records_newest_first() {
        let store = InMemoryActivityStore::new();
        store
            .create_activity_record(ActivityRecord::new(ActivityType::Dataset, "one"))
            .unwrap();
        store
            .create_activity_record(ActivityRecord::new(ActivityType::Dataset, "two"))
            .unwrap();
        let records = store.records(None).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(records[0].message, "two");
        assert_eq!(store.records(Some(1)).unwrap().len(), 1);
    }
}
