//! Manifest rows, file-info records and status results.

use dset_types::{is_dir_key, natural_sort_dedup, ContentHash};
use serde::{Deserialize, Serialize};

/// One row of the manifest: `key -> {"h": hash, "b": size, "m": mtime}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Full content hash. Always `None` for directories.
    #[serde(rename = "h")]
    pub hash: Option<ContentHash>,
    /// Size in bytes. `0` for directories.
    #[serde(rename = "b")]
    pub size_bytes: u64,
    /// Modification time, seconds since the epoch.
    #[serde(rename = "m")]
    pub mtime: f64,
}

impl ManifestEntry {
    pub fn file(hash: ContentHash, size_bytes: u64, mtime: f64) -> Self {
        Self {
            hash: Some(hash),
            size_bytes,
            mtime,
        }
    }

    pub fn directory(mtime: f64) -> Self {
        Self {
            hash: None,
            size_bytes: 0,
            mtime,
        }
    }
}

/// Caller-facing description of one manifest key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub key: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub modified_at: f64,
    /// Whether the bytes are materialized in the current revision directory.
    pub is_local: bool,
}

/// Created / modified / deleted keys, each natural-sorted and de-duplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl StatusResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort and de-duplicate every list.
    pub fn normalize(&mut self) {
        natural_sort_dedup(&mut self.created);
        natural_sort_dedup(&mut self.modified);
        natural_sort_dedup(&mut self.deleted);
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of changed keys across all lists.
    pub fn total(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }

    /// Whether any non-directory key changed.
    pub fn has_file_changes(&self) -> bool {
        self.created
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .any(|k| !is_dir_key(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_uses_short_field_names() {
        let hash = ContentHash::of_bytes(b"x");
        let json = serde_json::to_value(ManifestEntry::file(hash.clone(), 1, 2.5)).unwrap();
        assert_eq!(json["h"], hash.to_string());
        assert_eq!(json["b"], 1);
        assert_eq!(json["m"], 2.5);

        let dir = serde_json::to_value(ManifestEntry::directory(1.0)).unwrap();
        assert!(dir["h"].is_null());
        assert_eq!(dir["b"], 0);
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let mut status = StatusResult {
            created: vec!["f10".into(), "f2".into(), "f2".into()],
            modified: vec![],
            deleted: vec!["b".into(), "a".into()],
        };
        status.normalize();
        assert_eq!(status.created, vec!["f2", "f10"]);
        assert_eq!(status.deleted, vec!["a", "b"]);
        assert_eq!(status.total(), 4);
    }

    #[test]
    fn directory_only_status_has_no_file_changes() {
        let status = StatusResult {
            created: vec!["d/".into()],
            ..Default::default()
        };
        assert!(!status.is_empty());
        assert!(!status.has_file_changes());
    }
}
