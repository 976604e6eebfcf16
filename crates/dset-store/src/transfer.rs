use std::path::PathBuf;

use dset_types::Revision;
use serde::{Deserialize, Serialize};

/// An object waiting to be uploaded to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushObject {
    /// Absolute path of the object in the local store.
    pub object_path: PathBuf,
    /// Revision the object was queued under.
    pub revision: Revision,
    /// Dataset-relative key of the file.
    pub dataset_path: String,
}

/// An object to download into the local store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullObject {
    /// Absolute destination path in the local store.
    pub object_path: PathBuf,
    /// Revision the pull was requested for.
    pub revision: Revision,
    /// Dataset-relative key of the file.
    pub dataset_path: String,
}

impl PushObject {
    /// Remote object id: the file name of the object (its hash).
    pub fn object_id(&self) -> String {
        object_id(&self.object_path)
    }
}

impl PullObject {
    pub fn object_id(&self) -> String {
        object_id(&self.object_path)
    }
}

fn object_id(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
