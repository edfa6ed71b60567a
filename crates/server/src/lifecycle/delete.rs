use super::error::{LifecycleError, LifecycleResult};
use super::{Lifecycle, timed};
use crate::metrics;
use moada_core::{ClientIdentity, FileRecord, PrivateId};

impl Lifecycle {
    /// Delete one of the caller's files by private identifier.
    ///
    /// The catalog entry goes first, then the bytes, then the caller's usage
    /// is refreshed. Returns the removed record.
    #[tracing::instrument(skip(self, private_id), fields(identity = %identity))]
    pub async fn delete(
        &self,
        identity: &ClientIdentity,
        private_id: &PrivateId,
    ) -> LifecycleResult<FileRecord> {
        let io_timeout = self.limits.io_timeout;
        let row = self
            .metadata
            .get_file_by_private_id(private_id.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound("file not found".to_string()))?;
        let record = FileRecord::try_from(row)?;
        let key = self.key_for(identity, &record)?;

        // Only the owner has the bytes under its own directory.
        if !timed(io_timeout, "check stored file", self.storage.exists(&key)).await? {
            tracing::info!(public_id = %record.public_id, "Delete refused: not the caller's file");
            return Err(LifecycleError::NotFound("file not found".to_string()));
        }

        self.metadata
            .delete_file_by_private_id(private_id.as_str())
            .await?;

        if let Err(err) = timed(io_timeout, "remove stored file", self.storage.delete(&key)).await {
            tracing::error!(
                public_id = %record.public_id,
                key = %key,
                error = %err,
                "Corruption candidate: bytes left behind after catalog removal"
            );
            metrics::CORRUPTION_DETECTED.inc();
            return Err(LifecycleError::Corruption(format!(
                "file {} left on disk after catalog removal: {err}",
                record.public_id
            )));
        }

        if let Err(err) = self.ledger.upsert(identity).await {
            tracing::error!(
                public_id = %record.public_id,
                error = %err,
                "Corruption candidate: usage refresh failed after delete"
            );
            metrics::CORRUPTION_DETECTED.inc();
            return Err(LifecycleError::Ledger(Box::new(err)));
        }

        metrics::FILES_DELETED.inc();
        tracing::info!(public_id = %record.public_id, "File deleted");
        Ok(record)
    }
}
