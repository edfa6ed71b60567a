//! File catalog repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;

/// Repository for the file catalog.
///
/// Public and private identifiers are each unique across the catalog.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a catalog entry. Fails with `AlreadyExists` if either
    /// identifier is taken.
    async fn insert_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Resolve a public identifier.
    async fn get_file_by_public_id(&self, public_id: &str) -> MetadataResult<Option<FileRow>>;

    /// Resolve a private identifier.
    async fn get_file_by_private_id(&self, private_id: &str) -> MetadataResult<Option<FileRow>>;

    /// Resolve many public identifiers at once. Unknown ids are omitted.
    async fn get_files_by_public_ids(&self, public_ids: &[String])
    -> MetadataResult<Vec<FileRow>>;

    /// Delete the entry owning a private identifier, returning it.
    /// Fails with `NotFound` if no entry matches.
    async fn delete_file_by_private_id(&self, private_id: &str) -> MetadataResult<FileRow>;
}
