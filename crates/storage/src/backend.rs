use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use iotpipe_core::config::{AwsConfig, StorageConfig};

use crate::error::StorageError;

/// Unified storage backend wrapping object_store.
pub enum StorageBackend {
    Local(LocalBackend),
    S3(S3Backend),
    /// Process-local store, used by tests and dry runs.
    Memory(Arc<InMemory>),
}

impl StorageBackend {
    /// S3 when a bucket is configured, otherwise the local data dir.
    pub fn from_config(aws: &AwsConfig, storage: &StorageConfig) -> Result<Self, StorageError> {
        if aws.is_configured() {
            Ok(StorageBackend::S3(S3Backend::new(aws)?))
        } else {
            std::fs::create_dir_all(&storage.data_dir)?;
            Ok(StorageBackend::Local(LocalBackend::new(&storage.data_dir)?))
        }
    }

    pub fn in_memory() -> Self {
        StorageBackend::Memory(Arc::new(InMemory::new()))
    }

    /// Get the underlying ObjectStore.
    pub fn store(&self) -> &dyn ObjectStore {
        match self {
            StorageBackend::Local(b) => b.store.as_ref(),
            StorageBackend::S3(b) => b.store.as_ref(),
            StorageBackend::Memory(m) => m.as_ref(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Key prefix applied in front of every object (S3 only).
    pub fn prefix(&self) -> &str {
        match self {
            StorageBackend::S3(b) => &b.prefix,
            _ => "",
        }
    }

    /// Whether puts can carry content type and user metadata.
    /// The local filesystem store rejects attributes.
    pub fn supports_attributes(&self) -> bool {
        !matches!(self, StorageBackend::Local(_))
    }

    /// Full object path for a key, including the backend prefix.
    pub fn object_path(&self, key: &str) -> String {
        let prefix = self.prefix();
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    /// Externally meaningful URI for a key.
    pub fn uri(&self, key: &str) -> String {
        let path = self.object_path(key);
        match self {
            StorageBackend::Local(b) => format!("file://{}/{}", b.data_dir.display(), path),
            StorageBackend::S3(b) => format!("s3://{}/{}", b.bucket, path),
            StorageBackend::Memory(_) => format!("memory:///{}", path),
        }
    }
}

/// Local filesystem backend.
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub data_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(data_dir: &std::path::Path) -> Result<Self, StorageError> {
        let canonical = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            data_dir: canonical,
        })
    }
}

/// S3 backend.
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub prefix: String,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig) -> Result<Self, StorageError> {
        let bucket = aws
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET_NAME not set".into()))?;

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        match aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                // object_store requires absolute URLs
                let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.to_string()
                } else {
                    format!("https://{}", endpoint)
                };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_endpoint(&endpoint_url)
                    .with_allow_http(endpoint_url.starts_with("http://"));
            }
            None => {
                builder = builder.with_url(format!("s3://{}", bucket));
            }
        }

        let store = builder.build()?;

        let prefix = aws
            .s3_prefix
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();

        info!(
            "Storage: S3 backend s3://{}/{} (region: {})",
            bucket, prefix, aws.region
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws(bucket: Option<&str>, prefix: Option<&str>) -> AwsConfig {
        AwsConfig {
            region: "ap-south-1".into(),
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
            session_token: None,
            s3_bucket: bucket.map(String::from),
            s3_prefix: prefix.map(String::from),
            endpoint_url: Some("localhost:4566".into()),
        }
    }

    #[test]
    fn local_backend_when_no_bucket() {
        let tmp = std::env::temp_dir().join("iotpipe-storage-backend-test");
        let storage = StorageConfig {
            data_dir: tmp.clone(),
            key_prefix: "clean-data".into(),
            key_suffix: "readings".into(),
        };
        let backend = StorageBackend::from_config(&aws(None, None), &storage).unwrap();
        assert!(!backend.is_remote());
        assert!(!backend.supports_attributes());
        assert!(backend.uri("a/b.json").starts_with("file://"));
        assert!(backend.uri("a/b.json").ends_with("/a/b.json"));
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn s3_backend_prefixes_keys() {
        let backend = StorageBackend::S3(S3Backend::new(&aws(Some("iot-pipeline-data"), Some("/prod/"))).unwrap());
        assert!(backend.is_remote());
        assert_eq!(backend.prefix(), "prod");
        assert_eq!(backend.object_path("k.json"), "prod/k.json");
        assert_eq!(backend.uri("k.json"), "s3://iot-pipeline-data/prod/k.json");
    }

    #[test]
    fn s3_backend_requires_bucket() {
        assert!(matches!(
            S3Backend::new(&aws(None, None)),
            Err(StorageError::NotConfigured(_))
        ));
    }

    #[test]
    fn memory_uri() {
        let backend = StorageBackend::in_memory();
        assert!(backend.supports_attributes());
        assert_eq!(backend.uri("x/y.json"), "memory:///x/y.json");
    }
}
