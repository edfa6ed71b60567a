//! File store test double.

use async_trait::async_trait;
use bytes::Bytes;
use moada_storage::{ByteStream, FileStore, ObjectMeta, StorageError, StorageResult, StoredObject};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a real store and injects faults into its write and delete paths.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn FileStore>,
    fail_copy: bool,
    fail_delete: bool,
    copy_delay: Option<Duration>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn FileStore>) -> Self {
        Self {
            inner,
            fail_copy: false,
            fail_delete: false,
            copy_delay: None,
        }
    }

    /// Every copy into the store fails before writing anything.
    pub fn failing_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    /// Every delete fails and leaves the file in place.
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Copies wait this long, then complete normally.
    pub fn slow_copy(mut self, delay: Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("injected {what} failure")))
}

#[async_trait]
impl FileStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn copy_from_path(&self, source: &Path, key: &str) -> StorageResult<u64> {
        if self.fail_copy {
            return Err(injected("copy"));
        }
        if let Some(delay) = self.copy_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.copy_from_path(source, key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_delete {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn list_dir(&self, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        self.inner.list_dir(prefix).await
    }

    async fn total_size(&self) -> StorageResult<u64> {
        self.inner.total_size().await
    }

    async fn remove_dir_all(&self, prefix: &str) -> StorageResult<()> {
        self.inner.remove_dir_all(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
