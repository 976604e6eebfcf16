use std::fs;
use std::sync::Arc;

use dset_ledger::{
    ActivityRecord, ActivityStore, CommitEntry, FileActivityStore, FileVersionedLog, VersionedLog,
};
use dset_manifest::{Manifest, ManifestOptions, StatusResult};
use dset_store::{PullObject, PushObject};
use dset_sync::{BackendRegistry, IoManager, StorageBackend, TransferResult};
use tracing::info;

use crate::config::DatasetConfig;
use crate::error::{SdkError, SdkResult};

/// A dataset opened from its configuration: manifest, history and remote.
pub struct Dataset {
    config: DatasetConfig,
    manifest: Manifest,
    io: IoManager,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("root", &self.config.dataset_root)
            .field("revision", self.manifest.dataset_revision())
            .finish()
    }
}

impl Dataset {
    /// Initialize a new dataset: empty manifest, first commit, linked revision.
    pub fn create(config: DatasetConfig, registry: &BackendRegistry) -> SdkResult<Self> {
        config.validate()?;
        let root = &config.dataset_root;
        fs::create_dir_all(root).map_err(|source| SdkError::ConfigIo {
            path: root.clone(),
            source,
        })?;
        let log = Arc::new(FileVersionedLog::open(root)?);
        if log.head()?.is_some() {
            return Err(SdkError::AlreadyInitialized(root.clone()));
        }
        let activity = Arc::new(FileActivityStore::open(root));
        let manifest = Manifest::create(
            root,
            config.cache_manager(),
            log,
            activity,
            manifest_options(&config),
        )?;
        let io = build_io(&config, registry)?;
        info!(
            root = %root.display(),
            revision = %manifest.dataset_revision().short(),
            "created dataset"
        );
        Ok(Self {
            config,
            manifest,
            io,
        })
    }

    /// Open an existing dataset at its head revision.
    pub fn open(config: DatasetConfig, registry: &BackendRegistry) -> SdkResult<Self> {
        config.validate()?;
        let root = &config.dataset_root;
        let log = Arc::new(FileVersionedLog::open(root)?);
        if log.head()?.is_none() {
            return Err(SdkError::NotInitialized(root.clone()));
        }
        let activity = Arc::new(FileActivityStore::open(root));
        let manifest = Manifest::open(
            root,
            config.cache_manager(),
            log,
            activity,
            manifest_options(&config),
        )?;
        let io = build_io(&config, registry)?;
        Ok(Self {
            config,
            manifest,
            io,
        })
    }

    /// Swap the remote for an already-built backend.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.io = IoManager::new(
            backend,
            self.config.cache_manager(),
            self.config.sync.options(),
        );
        self
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    pub fn io(&self) -> &IoManager {
        &self.io
    }

    pub fn status(&mut self) -> SdkResult<StatusResult> {
        Ok(self.manifest.status()?)
    }

    /// Commit every local change.
    pub async fn save(&mut self, message: Option<&str>) -> SdkResult<StatusResult> {
        Ok(self.manifest.sweep_all_changes(false, message, None).await?)
    }

    /// Upload every queued object.
    pub async fn push(&self) -> SdkResult<TransferResult<PushObject>> {
        Ok(self.io.push_all().await?)
    }

    /// Download missing objects (all, or those under `keys`) and relink.
    pub async fn pull(&mut self, keys: Option<&[String]>) -> SdkResult<TransferResult<PullObject>> {
        let objects = self.manifest.objects_to_pull(keys)?;
        let result = self.io.pull_objects(&objects).await?;
        self.manifest.link_revision()?;
        Ok(result)
    }

    pub fn log(&self, limit: Option<usize>) -> SdkResult<Vec<CommitEntry>> {
        Ok(self.manifest.log().log(limit)?)
    }

    pub fn activity(&self, limit: Option<usize>) -> SdkResult<Vec<ActivityRecord>> {
        Ok(self.manifest.activity().records(limit)?)
    }
}

fn manifest_options(config: &DatasetConfig) -> ManifestOptions {
    ManifestOptions {
        num_hashing_cpus: config.hashing.num_cpus,
        ..Default::default()
    }
}

fn build_io(config: &DatasetConfig, registry: &BackendRegistry) -> SdkResult<IoManager> {
    let mut backend = registry.build(&config.backend, &config.backend_context())?;
    backend.set_credentials(config.credentials.clone());
    Ok(IoManager::new(
        Arc::from(backend),
        config.cache_manager(),
        config.sync.options(),
    ))
}
