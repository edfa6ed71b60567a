//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, FileStore, ObjectMeta, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-flight temporary files. Listings skip dotfiles.
const TEMP_PREFIX: &str = ".tmp.";

/// Local filesystem file store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, off the async runtime.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Sibling temp path for an atomic write to `path`.
    fn temp_path_for(path: &Path) -> PathBuf {
        path.with_file_name(format!("{TEMP_PREFIX}{}", Uuid::new_v4()))
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

fn io_context(e: std::io::Error, what: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(e.kind(), format!("{what}: {e}")))
}

/// Validate `key` and join it to `root`.
///
/// Rejects absolute keys, `..`/`.` components, and any path whose nearest
/// existing ancestor resolves (through symlinks) outside the root.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let path = root.join(key);
    let root_canonical = root
        .canonicalize()
        .map_err(|e| io_context(e, "failed to canonicalize root"))?;

    // Check the path itself when it exists, otherwise its nearest existing
    // ancestor, so that writes cannot create directories through a symlink.
    let mut candidate = Some(path.as_path());
    while let Some(current) = candidate {
        match std::fs::symlink_metadata(current) {
            Ok(meta) => {
                let canonical = current.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("symlink target missing or invalid: {key}"))
                    } else {
                        io_context(e, "failed to canonicalize path")
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                candidate = current.parent();
            }
            Err(e) => return Err(io_context(e, "failed to stat path")),
        }
    }

    Ok(path)
}

/// Fill a sibling temp file of `path`, fsync it and rename it into place.
/// The temp file is removed on failure.
fn write_atomically<T>(
    path: &Path,
    fill: impl FnOnce(&mut std::fs::File) -> std::io::Result<T>,
) -> StorageResult<T> {
    let temp_path = FilesystemBackend::temp_path_for(path);
    let written = (|| {
        let mut file = std::fs::File::create(&temp_path)?;
        let out = fill(&mut file)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)?;
        Ok::<T, std::io::Error>(out)
    })();

    if written.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    written.map_err(StorageError::Io)
}

fn copy_atomically(source: &Path, path: &Path) -> StorageResult<u64> {
    let mut reader = std::fs::File::open(source)
        .map_err(|e| io_context(e, "failed to open copy source"))?;
    write_atomically(path, |file| std::io::copy(&mut reader, file))
}

fn blocking_failed(e: tokio::task::JoinError) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
}

#[async_trait]
impl FileStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::symlink_metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path).await.map_err(not_found_or_io(key))?;

        Ok(ObjectMeta { size: metadata.len() })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(not_found_or_io(key))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn copy_from_path(&self, source: &Path, key: &str) -> StorageResult<u64> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        // Runs to completion even when the caller stops waiting, so the temp
        // file is always either renamed into place or removed.
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || copy_atomically(&source, &path))
            .await
            .map_err(blocking_failed)?
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        tokio::task::spawn_blocking(move || write_atomically(&path, |file| file.write_all(&data)))
            .await
            .map_err(blocking_failed)?
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_or_io(key))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_dir(&self, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        let dir = self.key_path(prefix).await?;
        let mut entries = fs::read_dir(&dir).await.map_err(not_found_or_io(prefix))?;

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let size = entry.metadata().await?.len();
            results.push(StoredObject { name, size });
        }

        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn total_size(&self) -> StorageResult<u64> {
        let mut total = 0u64;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // A client directory removed mid-scan
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    match entry.metadata().await {
                        Ok(meta) => total += meta.len(),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(StorageError::Io(e)),
                    }
                }
            }
        }
        Ok(total)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove_dir_all(&self, prefix: &str) -> StorageResult<()> {
        let dir = self.key_path(prefix).await?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root)
            .await
            .map_err(|e| io_context(e, "storage root not accessible"))?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, backend)
    }

    /// Write a file under the root without going through the backend.
    fn plant(root: &Path, key: &str, data: &[u8]) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_copy_and_stream() {
        let (dir, backend) = backend().await;
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("upload");
        std::fs::write(&source, b"hello world").unwrap();

        backend
            .copy_from_path(&source, "client/file.txt")
            .await
            .unwrap();
        assert!(backend.exists("client/file.txt").await.unwrap());
        assert_eq!(backend.head("client/file.txt").await.unwrap().size, 11);

        let chunks: Vec<Bytes> = backend
            .get_stream("client/file.txt")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"hello world");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("client"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("file.txt")]);
    }

    #[tokio::test]
    async fn test_put_replaces_atomically() {
        let (dir, backend) = backend().await;

        backend
            .put("client/note.txt", Bytes::from("first"))
            .await
            .unwrap();
        backend
            .put("client/note.txt", Bytes::from("second!"))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("client/note.txt")).unwrap(),
            b"second!"
        );
        let entries = std::fs::read_dir(dir.path().join("client")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_no_temp_file() {
        let (dir, backend) = backend().await;

        let err = backend
            .copy_from_path(Path::new("/nonexistent/moada/upload"), "client/x.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let entries = std::fs::read_dir(dir.path().join("client")).unwrap().count();
        assert_eq!(entries, 0);
        assert!(!backend.exists("client/x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, backend) = backend().await;

        assert!(!backend.exists("client/none.txt").await.unwrap());
        assert!(matches!(
            backend.head("client/none.txt").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete("client/none.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let (dir, backend) = backend().await;
        plant(dir.path(), "client/a.txt", b"a");
        assert!(!backend.exists("client").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_dir_is_flat_and_skips_temp_files() {
        let (dir, backend) = backend().await;

        plant(dir.path(), "client/a.txt", b"aa");
        plant(dir.path(), "client/b.png", b"bbb");
        plant(dir.path(), "client/nested/c.txt", b"c");
        plant(dir.path(), "client/.tmp.inflight", b"partial");

        let mut listed = backend.list_dir("client").await.unwrap();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            listed,
            vec![
                StoredObject {
                    name: "a.txt".to_string(),
                    size: 2
                },
                StoredObject {
                    name: "b.png".to_string(),
                    size: 3
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_missing_dir_errors() {
        let (_dir, backend) = backend().await;
        let err = backend.list_dir("nobody").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_total_size_is_recursive() {
        let (dir, backend) = backend().await;
        assert_eq!(backend.total_size().await.unwrap(), 0);

        plant(dir.path(), "a/1.txt", b"12345");
        plant(dir.path(), "b/2.txt", b"123");
        plant(dir.path(), "b/deep/3.txt", b"1");
        assert_eq!(backend.total_size().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_copy_from_path_drops_source_metadata() {
        let (dir, backend) = backend().await;
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("upload");
        std::fs::write(&source, b"copied bytes").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o700)).unwrap();
        }

        let n = backend.copy_from_path(&source, "client/x.txt").await.unwrap();
        assert_eq!(n, 12);
        assert_eq!(
            std::fs::read(dir.path().join("client/x.txt")).unwrap(),
            b"copied bytes"
        );
        assert!(source.exists(), "source must be left in place");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("client/x.txt"))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn test_remove_dir_all_is_idempotent() {
        let (dir, backend) = backend().await;
        plant(dir.path(), "client/a.txt", b"a");

        backend.remove_dir_all("client").await.unwrap();
        assert!(!dir.path().join("client").exists());
        backend.remove_dir_all("client").await.unwrap();
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, backend) = backend().await;

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.remove_dir_all("..").await.is_err());
        assert!(backend.remove_dir_all("").await.is_err());

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let (dir, backend) = backend().await;
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        symlink(outside.path(), dir.path().join("escape")).unwrap();

        let result = backend.get_stream("escape/secret.txt").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = backend
            .copy_from_path(&outside.path().join("secret.txt"), "escape/nested/file.txt")
            .await;
        match result {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }
        assert!(!outside.path().join("nested").exists());
    }
}
