//! Backend configuration and the name -> factory registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::StorageBackend;
use crate::error::{SyncError, SyncResult};
use crate::gigantum::GigantumObjectStore;
use crate::local::LocalFilesystem;
use crate::retry::RetryPolicy;
use crate::s3::PublicS3Bucket;
use crate::types::BackendKind;

/// Per-variant backend settings, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    GigantumObjectStore {
        endpoint: String,
    },
    LocalFilesystem {
        root: PathBuf,
    },
    PublicS3Bucket {
        bucket_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::GigantumObjectStore { .. } => BackendKind::GigantumObjectStore,
            Self::LocalFilesystem { .. } => BackendKind::LocalFilesystem,
            Self::PublicS3Bucket { .. } => BackendKind::PublicS3Bucket,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::GigantumObjectStore {
            endpoint: "https://api.gigantum.com/object-v1".into(),
        }
    }
}

/// Which dataset a backend instance serves.
#[derive(Clone, Debug)]
pub struct BackendContext {
    pub namespace: String,
    pub dataset_name: String,
    pub retry: RetryPolicy,
}

pub type BackendFactory = Box<
    dyn Fn(&BackendConfig, &BackendContext) -> SyncResult<Box<dyn StorageBackend>> + Send + Sync,
>;

/// Explicit mapping from backend name to constructor.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Construct the backend registered under the config's type name.
    pub fn build(
        &self,
        config: &BackendConfig,
        context: &BackendContext,
    ) -> SyncResult<Box<dyn StorageBackend>> {
        let name = config.kind().as_str();
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SyncError::UnknownBackend(name.to_string()))?;
        factory(config, context)
    }
}

impl Default for BackendRegistry {
    /// The three built-in backends.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            BackendKind::GigantumObjectStore.as_str(),
            Box::new(|config: &BackendConfig, ctx: &BackendContext| match config {
                BackendConfig::GigantumObjectStore { endpoint } => Ok(Box::new(
                    GigantumObjectStore::new(
                        endpoint.as_str(),
                        ctx.namespace.as_str(),
                        ctx.dataset_name.as_str(),
                        ctx.retry.clone(),
                    )?,
                )
                    as Box<dyn StorageBackend>),
                other => Err(SyncError::UnknownBackend(other.kind().to_string())),
            }),
        );
        registry.register(
            BackendKind::LocalFilesystem.as_str(),
            Box::new(|config: &BackendConfig, ctx: &BackendContext| match config {
                BackendConfig::LocalFilesystem { root } => Ok(Box::new(LocalFilesystem::new(
                    root,
                    &ctx.namespace,
                    &ctx.dataset_name,
                ))
                    as Box<dyn StorageBackend>),
                other => Err(SyncError::UnknownBackend(other.kind().to_string())),
            }),
        );
        registry.register(
            BackendKind::PublicS3Bucket.as_str(),
            Box::new(|config: &BackendConfig, ctx: &BackendContext| match config {
                BackendConfig::PublicS3Bucket { bucket_url, prefix } => Ok(Box::new(
                    PublicS3Bucket::new(bucket_url.as_str(), prefix.clone(), &ctx.retry)?,
                )
                    as Box<dyn StorageBackend>),
                other => Err(SyncError::UnknownBackend(other.kind().to_string())),
            }),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BackendContext {
        BackendContext {
            namespace: "alice".into(),
            dataset_name: "images".into(),
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn default_registers_builtins() {
        let registry = BackendRegistry::default();
        assert_eq!(
            registry.names(),
            vec!["gigantum_object_store", "local_filesystem", "public_s3_bucket"]
        );
    }

    #[test]
    fn builds_selected_variant() {
        let registry = BackendRegistry::default();
        let config = BackendConfig::LocalFilesystem {
            root: PathBuf::from("/tmp/mirror"),
        };
        let backend = registry.build(&config, &context()).unwrap();
        assert_eq!(backend.kind(), BackendKind::LocalFilesystem);
    }

    #[test]
    fn missing_factory_is_an_error() {
        let registry = BackendRegistry::empty();
        let err = registry
            .build(&BackendConfig::default(), &context())
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::UnknownBackend(n) if n == "gigantum_object_store"));
    }

    #[test]
    fn config_is_tagged_by_type() {
        let config = BackendConfig::PublicS3Bucket {
            bucket_url: "https://b.example".into(),
            prefix: None,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "public_s3_bucket");
        assert!(json.get("prefix").is_none());

        let unknown = serde_json::from_str::<BackendConfig>(r#"{"type": "ftp", "host": "x"}"#);
        assert!(unknown.is_err());
    }
}
