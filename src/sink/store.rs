use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create local directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Build the blob sink the ingestor writes to: a local directory rooted at
/// `bucket` when `--local` is set, otherwise an S3 (or S3-compatible) client.
pub fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>, StoreError> {
    if config.local {
        std::fs::create_dir_all(&config.bucket).map_err(|source| StoreError::CreateDir {
            path: config.bucket.clone(),
            source,
        })?;
        let store = LocalFileSystem::new_with_prefix(&config.bucket)?;
        return Ok(Arc::new(store));
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region);

    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            // MinIO and friends are usually reached over plain HTTP.
            .with_allow_http(true);
    }
    if let Some(access_key) = &config.access_key {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(secret_key) = &config.secret_key {
        builder = builder.with_secret_access_key(secret_key);
    }

    let store = builder.build()?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_local_store_creates_root_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("silo-output");
        let config = Config::parse_from([
            "logsilo",
            "--bucket",
            root.to_str().unwrap(),
            "--local",
        ]);

        let store = build_object_store(&config).unwrap();
        assert!(root.is_dir());
        drop(store);
    }

    #[test]
    fn test_s3_store_builds_with_explicit_credentials() {
        let config = Config::parse_from([
            "logsilo",
            "--bucket",
            "silo-bucket",
            "--endpoint",
            "http://127.0.0.1:9000",
            "--access-key",
            "minio",
            "--secret-key",
            "minio123",
        ]);

        // Construction must not perform I/O.
        build_object_store(&config).unwrap();
    }
}
