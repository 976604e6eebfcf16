use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dset_types::ContentHash;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::push_queue::PUSH_QUEUE_DIR;

/// Result of promoting a file into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// The file became a new object.
    Stored,
    /// An identical object already existed; the file was replaced by a link to it.
    Deduplicated,
}

/// How a revision-directory file refers to its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    HardLink,
    /// Fallback when hard links are refused. Not crash-safe: the revision
    /// copy dangles if the object is removed.
    Symlink,
}

/// Two-level sharded directory of immutable, hash-addressed files.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/<h[0:8]>/<h[8:16]>/<h>`
    pub fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let (a, b) = hash.shard();
        self.root.join(a).join(b).join(hash.as_str())
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Move `src` into the store under `hash` and leave a link at `src`.
    ///
    /// The object is created with an exclusive hard link, so the bytes are
    /// durable in the store before anything at `src` is touched. If the
    /// object already exists the file at `src` is discarded and relinked to
    /// the existing object.
    pub fn promote(&self, src: &Path, hash: &ContentHash) -> StoreResult<PromoteOutcome> {
        let obj = self.object_path(hash);
        if let Some(parent) = obj.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        match fs::hard_link(src, &obj) {
            Ok(()) => {
                debug!(hash = %hash.short_hex(), "stored new object");
                Ok(PromoteOutcome::Stored)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                fs::remove_file(src).map_err(|e| StoreError::io(src, e))?;
                self.link_into(hash, src)?;
                debug!(hash = %hash.short_hex(), "object already stored, relinked");
                Ok(PromoteOutcome::Deduplicated)
            }
            Err(e) if link_refused(&e) => {
                warn!(
                    path = %src.display(),
                    error = %e,
                    "hard link refused, moving object and falling back to symlink"
                );
                let outcome = if obj.exists() {
                    fs::remove_file(src).map_err(|e| StoreError::io(src, e))?;
                    PromoteOutcome::Deduplicated
                } else {
                    move_file(src, &obj)?;
                    PromoteOutcome::Stored
                };
                symlink_file(&obj, src).map_err(|e| StoreError::io(src, e))?;
                Ok(outcome)
            }
            Err(e) => Err(StoreError::io(src, e)),
        }
    }

    /// Materialize the object at `dest`, replacing whatever is there.
    pub fn link_into(&self, hash: &ContentHash, dest: &Path) -> StoreResult<LinkKind> {
        let obj = self.object_path(hash);
        if !obj.is_file() {
            return Err(StoreError::ObjectNotFound(hash.clone()));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        if fs::symlink_metadata(dest).is_ok() {
            fs::remove_file(dest).map_err(|e| StoreError::io(dest, e))?;
        }

        match fs::hard_link(&obj, dest) {
            Ok(()) => Ok(LinkKind::HardLink),
            Err(e) if link_refused(&e) => {
                warn!(path = %dest.display(), error = %e, "hard link refused, using symlink");
                symlink_file(&obj, dest).map_err(|e| StoreError::io(dest, e))?;
                Ok(LinkKind::Symlink)
            }
            Err(e) => Err(StoreError::io(dest, e)),
        }
    }

    /// Whether `dest` already resolves to the stored object, either as a hard
    /// link sharing its inode or as a symlink pointing at it.
    pub fn is_linked(&self, hash: &ContentHash, dest: &Path) -> bool {
        let obj = self.object_path(hash);
        match (fs::metadata(&obj), fs::metadata(dest)) {
            (Ok(a), Ok(b)) => same_file(&obj, &a, dest, &b),
            _ => false,
        }
    }

    /// Every object hash present on disk, sorted.
    pub fn list_objects(&self) -> StoreResult<Vec<ContentHash>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || e.file_name() != PUSH_QUEUE_DIR);
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                StoreError::io(path, io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                match ContentHash::from_hex(name) {
                    Ok(hash) => hashes.push(hash),
                    Err(_) => debug!(name, "ignoring stray file in object store"),
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    pub fn object_count(&self) -> StoreResult<usize> {
        Ok(self.list_objects()?.len())
    }
}

/// Errors where a hard link is impossible but a symlink may still work.
fn link_refused(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported
    ) || crosses_devices(e)
}

#[cfg(unix)]
fn crosses_devices(e: &io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn crosses_devices(_e: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn same_file(_a: &Path, a: &fs::Metadata, _b: &Path, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(a: &Path, _: &fs::Metadata, b: &Path, _: &fs::Metadata) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn move_file(src: &Path, dest: &Path) -> StoreResult<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dest).map_err(|e| StoreError::io(dest, e))?;
            fs::remove_file(src).map_err(|e| StoreError::io(src, e))
        }
    }
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[test]
    fn object_path_is_sharded() {
        let store = ObjectStore::new("/cache/objects");
        let hash = ContentHash::from_hex("0123456789abcdef55").unwrap();
        assert_eq!(
            store.object_path(&hash),
            PathBuf::from("/cache/objects/01234567/89abcdef/0123456789abcdef55")
        );
    }

    #[test]
    fn promote_stores_and_keeps_revision_copy() {
        let (dir, store) = setup();
        let src = dir.path().join("rev/a.txt");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"content").unwrap();
        let hash = ContentHash::of_bytes(b"content");

        assert_eq!(store.promote(&src, &hash).unwrap(), PromoteOutcome::Stored);
        assert!(store.contains(&hash));
        assert_eq!(fs::read(&src).unwrap(), b"content");
        assert_eq!(fs::read(store.object_path(&hash)).unwrap(), b"content");
    }

    #[test]
    fn identical_files_produce_one_object() {
        let (dir, store) = setup();
        let rev = dir.path().join("rev");
        fs::create_dir_all(&rev).unwrap();
        fs::write(rev.join("f1"), b"same bytes").unwrap();
        fs::write(rev.join("f2"), b"same bytes").unwrap();
        let hash = ContentHash::of_bytes(b"same bytes");

        assert_eq!(store.promote(&rev.join("f1"), &hash).unwrap(), PromoteOutcome::Stored);
        assert_eq!(
            store.promote(&rev.join("f2"), &hash).unwrap(),
            PromoteOutcome::Deduplicated
        );
        assert_eq!(store.object_count().unwrap(), 1);
        assert_eq!(fs::read(rev.join("f2")).unwrap(), b"same bytes");
    }

    #[cfg(unix)]
    #[test]
    fn promoted_copy_shares_inode_with_object() {
        use std::os::unix::fs::MetadataExt;

        let (dir, store) = setup();
        let src = dir.path().join("x");
        fs::write(&src, b"x").unwrap();
        let hash = ContentHash::of_bytes(b"x");
        store.promote(&src, &hash).unwrap();

        let a = fs::metadata(&src).unwrap();
        let b = fs::metadata(store.object_path(&hash)).unwrap();
        assert_eq!(a.ino(), b.ino());
    }

    #[test]
    fn link_into_missing_object_errors() {
        let (dir, store) = setup();
        let hash = ContentHash::of_bytes(b"absent");
        let err = store.link_into(&hash, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound(_)));
    }

    #[test]
    fn link_into_replaces_existing_file() {
        let (dir, store) = setup();
        let src = dir.path().join("a");
        fs::write(&src, b"object").unwrap();
        let hash = ContentHash::of_bytes(b"object");
        store.promote(&src, &hash).unwrap();

        let dest = dir.path().join("other/b");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"stale").unwrap();
        assert_eq!(store.link_into(&hash, &dest).unwrap(), LinkKind::HardLink);
        assert_eq!(fs::read(&dest).unwrap(), b"object");
    }

    #[test]
    fn is_linked_distinguishes_links_from_copies() {
        let (dir, store) = setup();
        let src = dir.path().join("a");
        fs::write(&src, b"object").unwrap();
        let hash = ContentHash::of_bytes(b"object");
        store.promote(&src, &hash).unwrap();
        assert!(store.is_linked(&hash, &src));

        let copy = dir.path().join("copy");
        fs::write(&copy, b"object").unwrap();
        assert!(!store.is_linked(&hash, &copy));
        assert!(!store.is_linked(&hash, &dir.path().join("absent")));
    }

    #[test]
    fn list_objects_skips_push_queue() {
        let (dir, store) = setup();
        fs::create_dir_all(store.root().join(PUSH_QUEUE_DIR).join("aa").join("bb")).unwrap();
        fs::write(
            store.root().join(PUSH_QUEUE_DIR).join("aa").join("bb").join("0123456789abcdef"),
            b"",
        )
        .unwrap();
        let src = dir.path().join("f");
        fs::write(&src, b"f").unwrap();
        let hash = ContentHash::of_bytes(b"f");
        store.promote(&src, &hash).unwrap();

        assert_eq!(store.list_objects().unwrap(), vec![hash]);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let (_dir, store) = setup();
        assert!(store.list_objects().unwrap().is_empty());
    }
}
