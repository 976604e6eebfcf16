use std::fs;
use std::path::{Path, PathBuf};

use dset_store::CacheManager;
use dset_sync::{BackendConfig, BackendContext, Credentials, RetryPolicy, SyncOptions};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

pub const BEARER_TOKEN_ENV: &str = "DSET_BEARER_TOKEN";
pub const ID_TOKEN_ENV: &str = "DSET_ID_TOKEN";

/// Everything needed to open a dataset, usually read from `dset.toml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Holds `manifest/manifest.json` and the `.dset` history.
    pub dataset_root: PathBuf,
    pub cache_base: PathBuf,
    pub username: String,
    pub namespace: String,
    pub dataset_name: String,
    pub hashing: HashingConfig,
    pub sync: SyncConfig,
    pub backend: BackendConfig,
    pub credentials: Credentials,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("dataset"),
            cache_base: PathBuf::from(".dset-cache"),
            username: "local".into(),
            namespace: "local".into(),
            dataset_name: "dataset".into(),
            hashing: HashingConfig::default(),
            sync: SyncConfig::default(),
            backend: BackendConfig::default(),
            credentials: Credentials::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Hashing workers; detected from the host when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_batch_bytes: u64,
    pub max_batch_objects: usize,
    pub max_concurrent_batches: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            max_batch_bytes: options.max_batch_bytes,
            max_batch_objects: options.max_batch_objects,
            max_concurrent_batches: options.max_concurrent_batches,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            max_batch_bytes: self.max_batch_bytes,
            max_batch_objects: self.max_batch_objects,
            max_concurrent_batches: self.max_concurrent_batches,
        }
    }
}

impl DatasetConfig {
    /// Read a TOML config. Relative paths are resolved against the file's
    /// directory and token environment variables override the file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SdkError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> SdkResult<()> {
        let text = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| SdkError::ConfigIo {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| SdkError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn resolve_relative(&mut self, base: &Path) {
        if self.dataset_root.is_relative() {
            self.dataset_root = base.join(&self.dataset_root);
        }
        if self.cache_base.is_relative() {
            self.cache_base = base.join(&self.cache_base);
        }
        if let BackendConfig::LocalFilesystem { root } = &mut self.backend {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }

    /// Override tokens from `lookup` (normally the process environment).
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(BEARER_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.credentials.bearer_token = Some(token);
        }
        if let Some(token) = lookup(ID_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.credentials.id_token = Some(token);
        }
        if self.credentials.username.is_none() {
            self.credentials.username = Some(self.username.clone());
        }
    }

    pub fn validate(&self) -> SdkResult<()> {
        for (field, value) in [
            ("username", &self.username),
            ("namespace", &self.namespace),
            ("dataset_name", &self.dataset_name),
        ] {
            if value.is_empty() || value.contains(|c: char| c == '/' || c == '\\') || value == ".." {
                return Err(SdkError::InvalidConfig(format!(
                    "{field} must be a single non-empty path segment, got {value:?}"
                )));
            }
        }
        if self.cache_base.starts_with(&self.dataset_root) {
            return Err(SdkError::InvalidConfig(format!(
                "cache_base {} must not be inside dataset_root {}",
                self.cache_base.display(),
                self.dataset_root.display()
            )));
        }
        Ok(())
    }

    /// `{cache_base}/{username}/{namespace}/{dataset_name}`
    pub fn cache_root(&self) -> PathBuf {
        self.cache_manager().cache_root().to_path_buf()
    }

    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::for_dataset(
            &self.cache_base,
            &self.username,
            &self.namespace,
            &self.dataset_name,
        )
    }

    pub fn backend_context(&self) -> BackendContext {
        BackendContext {
            namespace: self.namespace.clone(),
            dataset_name: self.dataset_name.clone(),
            retry: self.sync.retry.clone(),
        }
    }

    /// A copy safe to print: tokens are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |t: &mut Option<String>| {
            if t.is_some() {
                *t = Some("********".into());
            }
        };
        mask(&mut copy.credentials.bearer_token);
        mask(&mut copy.credentials.id_token);
        copy
    }
}
