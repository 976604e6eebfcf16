//! Landing transferred bytes on disk without ever clobbering an object.

use std::io;
use std::path::Path;

use dset_types::ContentHash;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

fn staging_file(dest: &Path) -> SyncResult<(std::fs::File, TempPath)> {
    let dir = dest.parent().ok_or_else(|| {
        SyncError::io(
            dest,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
        )
    })?;
    std::fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;
    let tmp = tempfile::Builder::new()
        .prefix(".transfer-")
        .tempfile_in(dir)
        .map_err(|e| SyncError::io(dir, e))?;
    Ok(tmp.into_parts())
}

/// Move a finished staging file into place. An existing destination wins.
fn persist_no_clobber(tmp: TempPath, dest: &Path) -> SyncResult<()> {
    match tmp.persist_noclobber(dest) {
        Ok(()) => Ok(()),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!(path = %dest.display(), "destination already present");
            Ok(())
        }
        Err(e) => Err(SyncError::io(dest, e.error)),
    }
}

/// Stream an HTTP body into `dest`, checking it hashes to `object_id`.
pub(crate) async fn stream_into_object(
    mut response: reqwest::Response,
    dest: &Path,
    object_id: &str,
) -> SyncResult<u64> {
    let (file, tmp) = staging_file(dest)?;
    let mut file = tokio::fs::File::from_std(file);
    let mut hasher = blake3::Hasher::new();
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(&*tmp, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| SyncError::io(&*tmp, e))?;
    drop(file);

    let actual = ContentHash::from_blake3(hasher.finalize());
    if !actual.as_str().eq_ignore_ascii_case(object_id) {
        return Err(SyncError::IntegrityMismatch {
            object: object_id.to_string(),
            actual: actual.to_string(),
        });
    }
    persist_no_clobber(tmp, dest)?;
    Ok(written)
}

/// Copy `src` to `dest` through a staging file. Returns bytes copied, or 0
/// when `dest` already existed.
pub(crate) async fn copy_no_clobber(src: &Path, dest: &Path) -> SyncResult<u64> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return Ok(0);
    }
    let (file, tmp) = staging_file(dest)?;
    drop(file);
    let copied = tokio::fs::copy(src, &*tmp)
        .await
        .map_err(|e| SyncError::io(src, e))?;
    persist_no_clobber(tmp, dest)?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copy_keeps_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("nested/dest");
        std::fs::write(&src, b"first").unwrap();

        assert_eq!(copy_no_clobber(&src, &dest).await.unwrap(), 5);
        std::fs::write(&src, b"second").unwrap();
        assert_eq!(copy_no_clobber(&src, &dest).await.unwrap(), 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".transfer-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
