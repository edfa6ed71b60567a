use super::error::{LifecycleError, LifecycleResult};
use super::{Lifecycle, timed};
use crate::metrics;
use moada_core::{ClientIdentity, ClientRecord, FileRecord, PublicId};
use moada_metadata::MetadataError;

/// Summary of an erase-all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Erased {
    /// Catalog entries removed.
    pub files: usize,
}

impl Lifecycle {
    /// Remove every file of `identity`, its directory and its record.
    ///
    /// Not atomic. Files already gone from the catalog or disk are skipped,
    /// so a failed erase can simply be retried.
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    pub async fn erase(&self, identity: &ClientIdentity) -> LifecycleResult<Erased> {
        let io_timeout = self.limits.io_timeout;
        let row = self
            .metadata
            .get_client(identity.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound("client not found".to_string()))?;
        let client = ClientRecord::try_from(row)?;

        let mut ids = client.files;
        match timed(io_timeout, "list client directory", self.storage.list_dir(identity.as_str()))
            .await
        {
            Ok(listing) => {
                for entry in listing {
                    if let Ok(id) = PublicId::from_stored_name(&entry.name)
                        && !ids.contains(&id)
                    {
                        ids.push(id);
                    }
                }
            }
            Err(LifecycleError::Storage(e)) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut erased = 0;
        for public_id in &ids {
            let Some(row) = self
                .metadata
                .get_file_by_public_id(public_id.as_str())
                .await?
            else {
                tracing::debug!(public_id = %public_id, "Already erased");
                continue;
            };
            let record = FileRecord::try_from(row)?;

            match self
                .metadata
                .delete_file_by_private_id(record.private_id.as_str())
                .await
            {
                Ok(_) | Err(MetadataError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }

            let key = self.key_for(identity, &record)?;
            match timed(io_timeout, "remove stored file", self.storage.delete(&key)).await {
                Ok(()) => {}
                Err(LifecycleError::Storage(e)) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            erased += 1;
        }

        timed(
            io_timeout,
            "remove client directory",
            self.storage.remove_dir_all(identity.as_str()),
        )
        .await?;

        match self.metadata.delete_client(identity.as_str()).await {
            Ok(()) | Err(MetadataError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        metrics::CLIENTS_ERASED.inc();
        tracing::info!(files = erased, "Client erased");
        Ok(Erased { files: erased })
    }
}
