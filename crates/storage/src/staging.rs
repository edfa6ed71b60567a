//! Staging area for uploads awaiting an antivirus verdict.
//!
//! Staged files live outside the storage root so that they never count
//! towards host usage and never appear in a client directory. A staged file
//! is deleted when its [`StagedFile`] handle is dropped.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::instrument;

/// Directory holding staged uploads.
#[derive(Clone, Debug)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Open (creating if needed) a staging directory.
    pub async fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` to a uniquely named staged file.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn stage(&self, data: Bytes) -> StorageResult<StagedFile> {
        let dir = self.dir.clone();
        let size = data.len() as u64;

        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.as_file().sync_all()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))??;

        Ok(StagedFile { path, size })
    }

    /// Number of files currently staged.
    pub async fn pending(&self) -> StorageResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// A staged upload. The file is removed when this handle is dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    size: u64,
}

impl StagedFile {
    /// Location of the staged bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the staged bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}
