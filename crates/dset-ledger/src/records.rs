use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dset_types::Revision;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Versioned log
// ---------------------------------------------------------------------------

/// One commit of the versioned log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub revision: Revision,
    pub parent: Option<Revision>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Snapshot of every tracked path and its content digest at this commit.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl CommitEntry {
    /// Commit id over parent, message, timestamp and the file snapshot.
    pub fn derive_revision(
        parent: Option<&Revision>,
        message: &str,
        timestamp: &DateTime<Utc>,
        files: &BTreeMap<String, String>,
    ) -> Revision {
        let mut material = Vec::new();
        if let Some(parent) = parent {
            material.extend_from_slice(parent.as_str().as_bytes());
        }
        material.push(b'\n');
        material.extend_from_slice(message.as_bytes());
        material.push(b'\n');
        material.extend_from_slice(timestamp.to_rfc3339().as_bytes());
        for (path, digest) in files {
            material.push(b'\n');
            material.extend_from_slice(path.as_bytes());
            material.push(b':');
            material.extend_from_slice(digest.as_bytes());
        }
        Revision::derive(&material)
    }
}

/// Working-tree state relative to the head commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStatus {
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
}

impl LogStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Dataset,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityDetailType {
    Dataset,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Create,
    Edit,
    Delete,
    NoAction,
}

/// Sub-record describing one changed item of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetailRecord {
    pub detail_type: ActivityDetailType,
    pub action: ActivityAction,
    pub show: bool,
    /// 0-255, higher is more important.
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Payloads keyed by MIME type (`text/plain`, `text/markdown`).
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ActivityDetailRecord {
    pub fn new(detail_type: ActivityDetailType, action: ActivityAction) -> Self {
        Self {
            detail_type,
            action,
            show: true,
            importance: 0,
            tags: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.show = false;
        self
    }

    pub fn add_value(mut self, mime: impl Into<String>, payload: impl Into<String>) -> Self {
        self.data.insert(mime.into(), payload.into());
        self
    }
}

/// A user-facing history entry linked to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub record_type: ActivityType,
    pub message: String,
    pub linked_commit: Option<Revision>,
    pub show: bool,
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Vec<ActivityDetailRecord>,
}

impl ActivityRecord {
    pub fn new(record_type: ActivityType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            record_type,
            message: message.into(),
            linked_commit: None,
            show: true,
            importance: 0,
            tags: Vec::new(),
            timestamp: Utc::now(),
            details: Vec::new(),
        }
    }

    pub fn with_linked_commit(mut self, revision: Revision) -> Self {
        self.linked_commit = Some(revision);
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_detail(&mut self, detail: ActivityDetailRecord) {
        self.details.push(detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_depends_on_every_input() {
        let ts = Utc::now();
        let mut files = BTreeMap::new();
        files.insert("manifest/manifest.json".to_string(), "aa".to_string());

        let base = CommitEntry::derive_revision(None, "msg", &ts, &files);
        assert_eq!(base, CommitEntry::derive_revision(None, "msg", &ts, &files));
        assert_ne!(base, CommitEntry::derive_revision(None, "other", &ts, &files));
        assert_ne!(
            base,
            CommitEntry::derive_revision(Some(&base), "msg", &ts, &files)
        );

        files.insert("manifest/manifest.json".to_string(), "bb".to_string());
        assert_ne!(base, CommitEntry::derive_revision(None, "msg", &ts, &files));
    }

    #[test]
    fn activity_record_builder() {
        let mut record = ActivityRecord::new(ActivityType::Dataset, "Created 1 file")
            .with_importance(0)
            .with_tags(["save"]);
        record.add_detail(
            ActivityDetailRecord::new(ActivityDetailType::Dataset, ActivityAction::Create)
                .with_importance(255)
                .hidden()
                .add_value("text/markdown", "Created `a.txt`"),
        );
        assert_eq!(record.tags, vec!["save"]);
        assert_eq!(record.details.len(), 1);
        assert!(!record.details[0].show);
        assert_eq!(record.details[0].data["text/markdown"], "Created `a.txt`");
    }

    #[test]
    fn activity_record_serde_roundtrip() {
        let record = ActivityRecord::new(ActivityType::Note, "hello")
            .with_linked_commit(Revision::parse("abcdef").unwrap());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"record_type\":\"note\""));
        let back: ActivityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn empty_status_is_clean() {
        assert!(LogStatus::default().is_clean());
        let status = LogStatus {
            untracked: vec!["x".into()],
            ..Default::default()
        };
        assert!(!status.is_clean());
    }
}
