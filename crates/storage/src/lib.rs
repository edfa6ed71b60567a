//! File storage abstraction and backends for MOADA.
//!
//! This crate provides:
//! - Per-client directories of stored files with atomic writes
//! - Directory listings and recursive usage scans for quota accounting
//! - A staging area for uploads awaiting an antivirus verdict
//! - A local filesystem backend

pub mod backends;
pub mod error;
pub mod staging;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use staging::{StagedFile, StagingArea};
pub use traits::{ByteStream, FileStore, ObjectMeta, StoredObject};

use moada_core::config::StorageConfig;
use std::sync::Arc;

/// Create a file store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn FileStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path, .. } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

/// Create the staging area from configuration.
pub async fn staging_from_config(config: &StorageConfig) -> StorageResult<StagingArea> {
    StagingArea::new(config.staging_dir()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("files"),
            staging_path: None,
        };

        let store = from_config(&config).await.unwrap();
        let staging = staging_from_config(&config).await.unwrap();
        assert_eq!(staging.dir(), temp.path().join("staging").as_path());

        let staged = staging.stage(Bytes::from_static(b"hi")).await.unwrap();
        store
            .copy_from_path(staged.path(), "client/hello.txt")
            .await
            .unwrap();
        assert!(store.exists("client/hello.txt").await.unwrap());
    }

    #[tokio::test]
    async fn from_config_rejects_nested_staging() {
        let config = StorageConfig::Filesystem {
            path: PathBuf::from("/tmp/moada-files"),
            staging_path: Some(PathBuf::from("/tmp/moada-files/staging")),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
