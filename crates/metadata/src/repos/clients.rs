//! Client record repository.

use crate::error::MetadataResult;
use crate::models::ClientRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for anonymous client records, keyed by identity token.
#[async_trait]
pub trait ClientRepo: Send + Sync {
    /// Check whether a record exists.
    async fn client_exists(&self, identity: &str) -> MetadataResult<bool>;

    /// Get a record.
    async fn get_client(&self, identity: &str) -> MetadataResult<Option<ClientRow>>;

    /// Create a record. Fails with `AlreadyExists` on a duplicate identity.
    async fn create_client(&self, client: &ClientRow) -> MetadataResult<()>;

    /// Overwrite the usage fields of a record.
    async fn update_client_usage(
        &self,
        identity: &str,
        files: &[String],
        used_space: i64,
        expires_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Overwrite the rate-limit counters of a record.
    async fn update_client_calls(
        &self,
        identity: &str,
        api_calls: i64,
        last_call_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a record. Fails with `NotFound` if absent.
    async fn delete_client(&self, identity: &str) -> MetadataResult<()>;
}
