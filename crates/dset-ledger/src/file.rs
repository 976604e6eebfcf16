//! File-backed log and activity store under `{dataset_root}/.dset/`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use dset_types::Revision;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{LedgerError, LedgerResult};
use crate::records::{ActivityRecord, CommitEntry, LogStatus};
use crate::traits::{ActivityStore, VersionedLog};

/// Bookkeeping directory inside the dataset root. Never tracked.
pub const LEDGER_DIR: &str = ".dset";

const HISTORY_FILE: &str = "history.json";
const ACTIVITY_FILE: &str = "activity.jsonl";

// ---------------------------------------------------------------------------
// Versioned log
// ---------------------------------------------------------------------------

/// Commit log persisted as a JSON array in `.dset/history.json`.
///
/// Each commit snapshots the BLAKE3 digest of every tracked file, which is
/// what `status()` diffs the working tree against.
pub struct FileVersionedLog {
    root: PathBuf,
    history_path: PathBuf,
    state: RwLock<FileLogState>,
}

#[derive(Default)]
struct FileLogState {
    commits: Vec<CommitEntry>,
    staged: BTreeSet<String>,
}

impl FileVersionedLog {
    /// Open (or start) the log for `root`.
    pub fn open(root: impl Into<PathBuf>) -> LedgerResult<Self> {
        let root = root.into();
        let history_path = root.join(LEDGER_DIR).join(HISTORY_FILE);
        let commits = match fs::read(&history_path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(LedgerError::io(&history_path, e)),
        };
        Ok(Self {
            root,
            history_path,
            state: RwLock::new(FileLogState {
                commits,
                staged: BTreeSet::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn save(&self, commits: &[CommitEntry]) -> LedgerResult<()> {
        let dir = self.root.join(LEDGER_DIR);
        fs::create_dir_all(&dir).map_err(|e| LedgerError::io(&dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| LedgerError::io(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, commits)?;
        tmp.flush().map_err(|e| LedgerError::io(&self.history_path, e))?;
        tmp.persist(&self.history_path)?;
        Ok(())
    }

    fn working_files(&self) -> LedgerResult<Vec<String>> {
        let mut files = Vec::new();
        if !self.root.is_dir() {
            return Ok(files);
        }
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != LEDGER_DIR);
        for entry in walker {
            let entry = entry.map_err(|e| {
                LedgerError::io(&self.root, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(relative_key(rel)?);
            }
        }
        files.sort();
        Ok(files)
    }

    fn digest(&self, rel: &str) -> LedgerResult<Option<String>> {
        let path = self.root.join(rel);
        match fs::read(&path) {
            Ok(data) => Ok(Some(blake3::hash(&data).to_hex().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::io(&path, e)),
        }
    }
}

fn relative_key(rel: &Path) -> LedgerResult<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(LedgerError::InvalidPath(rel.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

impl VersionedLog for FileVersionedLog {
    fn add(&self, path: &str) -> LedgerResult<()> {
        let key = relative_key(Path::new(path))?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.staged.insert(key);
        Ok(())
    }

    fn add_all(&self) -> LedgerResult<()> {
        let files = self.working_files()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Tracked files that vanished are staged too so the commit drops them.
        let tracked: Vec<String> = state
            .commits
            .last()
            .map(|c| c.files.keys().cloned().collect())
            .unwrap_or_default();
        state.staged.extend(files);
        state.staged.extend(tracked);
        Ok(())
    }

    fn commit(&self, message: &str) -> LedgerResult<Revision> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let parent = state.commits.last().map(|c| c.revision.clone());
        let mut files: BTreeMap<String, String> = state
            .commits
            .last()
            .map(|c| c.files.clone())
            .unwrap_or_default();
        for path in &state.staged {
            match self.digest(path)? {
                Some(digest) => {
                    files.insert(path.clone(), digest);
                }
                None => {
                    files.remove(path);
                }
            }
        }

        let timestamp = Utc::now();
        let revision = CommitEntry::derive_revision(parent.as_ref(), message, &timestamp, &files);
        let mut commits = state.commits.clone();
        commits.push(CommitEntry {
            revision: revision.clone(),
            parent,
            message: message.to_string(),
            timestamp,
            files,
        });
        self.save(&commits)?;

        state.commits = commits;
        state.staged.clear();
        info!(revision = %revision.short(), "committed");
        Ok(revision)
    }

    fn head(&self) -> LedgerResult<Option<Revision>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.commits.last().map(|c| c.revision.clone()))
    }

    fn log(&self, limit: Option<usize>) -> LedgerResult<Vec<CommitEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let iter = state.commits.iter().rev().cloned();
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    fn log_entry(&self, revision: &Revision) -> LedgerResult<CommitEntry> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .commits
            .iter()
            .find(|c| &c.revision == revision)
            .cloned()
            .ok_or_else(|| LedgerError::RevisionNotFound(revision.clone()))
    }

    fn status(&self) -> LedgerResult<LogStatus> {
        let working = self.working_files()?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let head_files = state
            .commits
            .last()
            .map(|c| c.files.clone())
            .unwrap_or_default();

        let mut status = LogStatus {
            staged: state.staged.iter().cloned().collect(),
            ..Default::default()
        };
        for path in &working {
            match head_files.get(path) {
                None => status.untracked.push(path.clone()),
                Some(digest) => {
                    if self.digest(path)?.as_deref() != Some(digest.as_str()) {
                        status.modified.push(path.clone());
                    }
                }
            }
        }
        let working: BTreeSet<&String> = working.iter().collect();
        status.deleted = head_files
            .keys()
            .filter(|k| !working.contains(k))
            .cloned()
            .collect();
        debug!(clean = status.is_clean(), "computed log status");
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Activity store
// ---------------------------------------------------------------------------

/// Activity records appended as JSON lines to `.dset/activity.jsonl`.
pub struct FileActivityStore {
    path: PathBuf,
}

impl FileActivityStore {
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(LEDGER_DIR).join(ACTIVITY_FILE),
        }
    }
}

impl ActivityStore for FileActivityStore {
    fn create_activity_record(&self, record: ActivityRecord) -> LedgerResult<ActivityRecord> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::io(&self.path, e))?;
        Ok(record)
    }

    fn records(&self, limit: Option<usize>) -> LedgerResult<Vec<ActivityRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::io(&self.path, e)),
        };
        let mut records = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<ActivityRecord>, _>>()?;
        records.reverse();
        if let Some(n) = limit {
            records.truncate(n);
        }
        Ok(records)
    }
}
