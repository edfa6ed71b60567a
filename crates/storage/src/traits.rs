//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// File store holding one flat directory of files per client.
///
/// Keys are `/`-separated paths relative to the storage root. Backends must
/// reject keys that would escape the root.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    /// Check if a file exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a file's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get a file as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Write bytes held in memory, atomically and creating parent
    /// directories. Uploads do not use it: they go through
    /// [`copy_from_path`](Self::copy_from_path) from the staging area.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Copy the content of a local file into the store, atomically and
    /// creating parent directories.
    ///
    /// Only bytes are carried over: the stored file is freshly created, so
    /// timestamps, ownership and permissions of `source` are not preserved.
    /// Returns the number of bytes written.
    async fn copy_from_path(&self, source: &Path, key: &str) -> StorageResult<u64>;

    /// Delete a file.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List the regular files directly inside a directory.
    ///
    /// Subdirectories, symlinks and in-flight temporary files are skipped.
    /// A missing directory is an error.
    async fn list_dir(&self, prefix: &str) -> StorageResult<Vec<StoredObject>>;

    /// Total size of all regular files under the root, scanned recursively.
    async fn total_size(&self) -> StorageResult<u64>;

    /// Remove a directory and everything in it. A missing directory is not
    /// an error.
    async fn remove_dir_all(&self, prefix: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored file.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// File size in bytes.
    pub size: u64,
}

/// An entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// File name within the directory.
    pub name: String,
    /// Size on disk in bytes.
    pub size: u64,
}
