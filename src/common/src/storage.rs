use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use object_store::path::Path;
use object_store::{
    ObjectStore, PutPayload, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory,
};
use url::Url;

use crate::config::StorageConfig;
use crate::model::ObjectLocation;

/// Errors raised by artifact (object store) calls
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("No object store configured for bucket '{0}'")]
    UnknownBucket(String),

    #[error("Object store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl ArtifactError {
    /// Throttling, network and timeout failures; configuration errors are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ArtifactError::Timeout(_) => true,
            ArtifactError::ObjectStore(e) => matches!(e, object_store::Error::Generic { .. }),
            ArtifactError::UnknownBucket(_) => false,
        }
    }
}

/// Location-addressed access to stored artifacts
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Delete one object. A missing object is not an error.
    async fn delete(&self, location: &ObjectLocation) -> Result<(), ArtifactError>;

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, ArtifactError>;

    async fn put(&self, location: &ObjectLocation, payload: Vec<u8>) -> Result<(), ArtifactError>;
}

/// Registry resolving bucket names to object store clients
#[derive(Debug, Clone, Default)]
pub struct BucketStores {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl BucketStores {
    /// Build one client per configured bucket.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut stores = Self::default();
        for (bucket, dsn) in &config.buckets {
            let store = create_object_store_from_dsn(dsn)
                .with_context(|| format!("Failed to create object store for bucket '{bucket}'"))?;
            log::info!("Registered object store for bucket '{bucket}'");
            stores = stores.with_store(bucket.clone(), store);
        }
        Ok(stores)
    }

    /// Fresh in-memory store for each named bucket
    pub fn in_memory<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        buckets.into_iter().fold(Self::default(), |stores, bucket| {
            stores.with_store(bucket, Arc::new(InMemory::new()))
        })
    }

    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    pub fn store_for(&self, bucket: &str) -> Result<&Arc<dyn ObjectStore>, ArtifactError> {
        self.stores
            .get(bucket)
            .ok_or_else(|| ArtifactError::UnknownBucket(bucket.to_string()))
    }

    pub fn buckets(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

#[async_trait]
impl ArtifactStore for BucketStores {
    async fn delete(&self, location: &ObjectLocation) -> Result<(), ArtifactError> {
        let store = self.store_for(&location.bucket)?;
        match store.delete(&Path::from(location.key.as_str())).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                log::debug!("Object {location} already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, ArtifactError> {
        let store = self.store_for(&location.bucket)?;
        match store.head(&Path::from(location.key.as_str())).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, location: &ObjectLocation, payload: Vec<u8>) -> Result<(), ArtifactError> {
        let store = self.store_for(&location.bucket)?;
        store
            .put(&Path::from(location.key.as_str()), PutPayload::from(payload))
            .await?;
        Ok(())
    }
}

/// Create an object store from a DSN string
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url =
        Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "File DSN must specify a path: file:///path/to/storage"
                ));
            }
            std::fs::create_dir_all(path)
                .with_context(|| format!("Failed to create storage directory '{path}'"))?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = create_s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: file, memory, s3",
            scheme
        )),
    }
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        return Err(anyhow::anyhow!(
            "S3 DSN must specify a bucket: s3://host/bucket"
        ));
    }

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    let secret_key = dsn.password().unwrap_or("");

    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }

    // S3-compatible endpoints (MinIO, localstack) need an explicit path-style endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    if access_key.is_empty() {
        if let Ok(env_key) = std::env::var("AWS_ACCESS_KEY_ID") {
            builder = builder.with_access_key_id(env_key);
        }
        if let Ok(env_secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            builder = builder.with_secret_access_key(env_secret);
        }
        if let Ok(env_region) = std::env::var("AWS_DEFAULT_REGION") {
            builder = builder.with_region(env_region);
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_object_store() {
        let object_store = create_object_store_from_dsn("memory://").unwrap();
        assert!(Arc::strong_count(&object_store) == 1);
    }

    #[test]
    fn test_invalid_dsn() {
        let result = create_object_store_from_dsn("not-a-url");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid storage DSN")
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = create_object_store_from_dsn("gcs://bucket/prefix");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported storage scheme")
        );
    }

    #[test]
    fn test_s3_dsn_parsing() {
        let result = create_s3_builder_from_dsn(
            &Url::parse("s3://access:secret@localhost:9000/bucket").unwrap(),
        );
        assert!(result.is_ok());

        let result = create_s3_builder_from_dsn(&Url::parse("s3://localhost:9000/").unwrap());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must specify a bucket")
        );
    }

    #[test]
    fn test_from_config_registers_every_bucket() {
        let config = StorageConfig::default()
            .with_bucket("protected", "memory://")
            .with_bucket("private", "memory://");

        let stores = BucketStores::from_config(&config).unwrap();
        let mut buckets: Vec<_> = stores.buckets().collect();
        buckets.sort();
        assert_eq!(buckets, vec!["private", "protected"]);
    }

    #[tokio::test]
    async fn test_delete_missing_object_succeeds() {
        let stores = BucketStores::in_memory(["b"]);
        let location = ObjectLocation::new("b", "never/written.hdf");

        stores.delete(&location).await.unwrap();
        assert!(!stores.exists(&location).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_then_delete() {
        let stores = BucketStores::in_memory(["b"]);
        let location = ObjectLocation::new("b", "gran-1/k1");

        stores.put(&location, b"payload".to_vec()).await.unwrap();
        assert!(stores.exists(&location).await.unwrap());

        stores.delete(&location).await.unwrap();
        assert!(!stores.exists(&location).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_permanent_error() {
        let stores = BucketStores::in_memory(["b"]);
        let err = stores
            .delete(&ObjectLocation::new("other", "k"))
            .await
            .unwrap_err();

        assert!(matches!(err, ArtifactError::UnknownBucket(ref b) if b == "other"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_filesystem_store_treats_missing_object_as_deleted() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dsn = format!("file://{}", temp_dir.path().display());
        let stores =
            BucketStores::default().with_store("b", create_object_store_from_dsn(&dsn).unwrap());

        let location = ObjectLocation::new("b", "granules/k1.hdf");
        stores.put(&location, b"data".to_vec()).await.unwrap();
        stores.delete(&location).await.unwrap();
        stores.delete(&location).await.unwrap();
        assert!(!stores.exists(&location).await.unwrap());
    }
}
