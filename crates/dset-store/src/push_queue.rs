//! Per-revision queue of objects awaiting upload.
//!
//! One plain-text file per revision under `objects/.push/`, named by the
//! revision. Each line is `relative_path,absolute_object_path`. Files are
//! appended to while promoting and rewritten only by push reconciliation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use dset_types::Revision;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::transfer::PushObject;

/// Directory (inside the object root) holding the queue files.
pub const PUSH_QUEUE_DIR: &str = ".push";

#[derive(Debug, Clone)]
pub struct PushQueue {
    objects_root: PathBuf,
    dir: PathBuf,
}

impl PushQueue {
    pub fn new(objects_root: impl Into<PathBuf>) -> Self {
        let objects_root = objects_root.into();
        let dir = objects_root.join(PUSH_QUEUE_DIR);
        Self { objects_root, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn queue_file(&self, revision: &Revision) -> PathBuf {
        self.dir.join(revision.as_str())
    }

    /// Append `(dataset_path, object_path)` pairs to the revision's queue.
    pub fn enqueue(&self, revision: &Revision, entries: &[(String, PathBuf)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.queue_file(revision);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        let mut buf = String::new();
        for (key, object_path) in entries {
            buf.push_str(&format_line(key, object_path));
        }
        file.write_all(buf.as_bytes())
            .map_err(|e| StoreError::io(&path, e))?;
        debug!(revision = %revision, count = entries.len(), "queued objects for push");
        Ok(())
    }

    /// Entries queued under one revision, in file order.
    pub fn load(&self, revision: &Revision) -> StoreResult<Vec<PushObject>> {
        let path = self.queue_file(revision);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let (key, object_path) = parse_line(line, &self.objects_root).ok_or_else(|| {
                    StoreError::MalformedQueueLine {
                        file: path.clone(),
                        line: line.to_string(),
                    }
                })?;
                Ok(PushObject {
                    object_path,
                    revision: revision.clone(),
                    dataset_path: key,
                })
            })
            .collect()
    }

    /// Revisions that currently have a queue file.
    pub fn revisions(&self) -> StoreResult<Vec<Revision>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };
        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(rev) = entry.file_name().to_str().and_then(|n| Revision::parse(n).ok()) {
                revisions.push(rev);
            }
        }
        revisions.sort();
        Ok(revisions)
    }

    /// Every queued entry across all revisions.
    pub fn load_all(&self) -> StoreResult<Vec<PushObject>> {
        let mut all = Vec::new();
        for revision in self.revisions()? {
            all.extend(self.load(&revision)?);
        }
        Ok(all)
    }

    /// Replace the revision's queue with exactly `remaining`.
    ///
    /// An empty `remaining` removes the file.
    pub fn rewrite(&self, revision: &Revision, remaining: &[PushObject]) -> StoreResult<()> {
        if remaining.is_empty() {
            return self.remove(revision);
        }
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.queue_file(revision);
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        for obj in remaining {
            tmp.write_all(format_line(&obj.dataset_path, &obj.object_path).as_bytes())
                .map_err(|e| StoreError::io(&path, e))?;
        }
        tmp.persist(&path)?;
        Ok(())
    }

    pub fn remove(&self, revision: &Revision) -> StoreResult<()> {
        let path = self.queue_file(revision);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.revisions()?.is_empty())
    }
}

fn format_line(key: &str, object_path: &Path) -> String {
    format!("{key},{}\n", object_path.display())
}

/// Split a queue line. Keys may contain commas, so the split point is the
/// comma that introduces the object root; the last comma is the fallback.
fn parse_line(line: &str, objects_root: &Path) -> Option<(String, PathBuf)> {
    let marker = format!(",{}", objects_root.display());
    let (key, object) = match line.find(&marker) {
        Some(idx) => (&line[..idx], &line[idx + 1..]),
        None => line.rsplit_once(',')?,
    };
    if key.is_empty() || object.is_empty() {
        return None;
    }
    Some((key.to_string(), PathBuf::from(object)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rev(s: &str) -> Revision {
        Revision::parse(s).unwrap()
    }

    fn setup() -> (TempDir, PushQueue) {
        let dir = TempDir::new().unwrap();
        let queue = PushQueue::new(dir.path().join("objects"));
        (dir, queue)
    }

    #[test]
    fn enqueue_then_load() {
        let (dir, queue) = setup();
        let obj = dir.path().join("objects/aaaaaaaa/bbbbbbbb/aaaaaaaabbbbbbbbcc");
        queue
            .enqueue(&rev("abc"), &[("a.txt".into(), obj.clone())])
            .unwrap();

        let raw = fs::read_to_string(queue.queue_file(&rev("abc"))).unwrap();
        assert_eq!(raw, format!("a.txt,{}\n", obj.display()));

        let loaded = queue.load(&rev("abc")).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].dataset_path, "a.txt");
        assert_eq!(loaded[0].object_path, obj);
        assert_eq!(loaded[0].revision, rev("abc"));
    }

    #[test]
    fn key_with_comma_survives() {
        let (dir, queue) = setup();
        let obj = dir.path().join("objects/11111111/22222222/1111111122222222");
        queue
            .enqueue(&rev("abc"), &[("a,b,c.csv".into(), obj.clone())])
            .unwrap();
        let loaded = queue.load(&rev("abc")).unwrap();
        assert_eq!(loaded[0].dataset_path, "a,b,c.csv");
        assert_eq!(loaded[0].object_path, obj);
    }

    #[test]
    fn load_all_spans_revisions() {
        let (dir, queue) = setup();
        let obj = dir.path().join("objects/x");
        queue.enqueue(&rev("aa"), &[("one".into(), obj.clone())]).unwrap();
        queue
            .enqueue(&rev("bb"), &[("two".into(), obj.clone()), ("three".into(), obj)])
            .unwrap();
        assert_eq!(queue.revisions().unwrap(), vec![rev("aa"), rev("bb")]);
        assert_eq!(queue.load_all().unwrap().len(), 3);
        assert!(!queue.is_empty().unwrap());
    }

    #[test]
    fn rewrite_keeps_exact_remainder() {
        let (dir, queue) = setup();
        let obj = dir.path().join("objects/x");
        queue
            .enqueue(
                &rev("aa"),
                &[("one".into(), obj.clone()), ("two".into(), obj.clone())],
            )
            .unwrap();
        let loaded = queue.load(&rev("aa")).unwrap();
        queue.rewrite(&rev("aa"), &loaded[1..]).unwrap();

        let after = queue.load(&rev("aa")).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].dataset_path, "two");

        queue.rewrite(&rev("aa"), &[]).unwrap();
        assert!(!queue.queue_file(&rev("aa")).exists());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn missing_queue_is_empty() {
        let (_dir, queue) = setup();
        assert!(queue.load(&rev("abc")).unwrap().is_empty());
        assert!(queue.is_empty().unwrap());
        queue.remove(&rev("abc")).unwrap();
    }

    #[test]
    fn malformed_line_is_an_error() {
        let (_dir, queue) = setup();
        fs::create_dir_all(queue.dir()).unwrap();
        fs::write(queue.queue_file(&rev("abc")), "no-separator\n").unwrap();
        assert!(matches!(
            queue.load(&rev("abc")),
            Err(StoreError::MalformedQueueLine { .. })
        ));
    }
}
