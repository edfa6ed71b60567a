use super::error::{LifecycleError, LifecycleResult};
use super::{Lifecycle, timed};
use moada_core::{ClientIdentity, FileRecord, PublicId};
use moada_storage::ByteStream;

/// A file ready to be streamed to the caller.
pub struct Download {
    pub record: FileRecord,
    /// Size of the stored bytes.
    pub size: u64,
    pub stream: ByteStream,
}

impl Lifecycle {
    /// Open a file by public identifier.
    ///
    /// The bytes are looked up in the caller's own directory; a catalog hit
    /// without bytes there is reported as `NotFound`.
    #[tracing::instrument(skip(self), fields(identity = %identity, public_id = %public_id))]
    pub async fn download(
        &self,
        identity: &ClientIdentity,
        public_id: &PublicId,
    ) -> LifecycleResult<Download> {
        let io_timeout = self.limits.io_timeout;
        let row = self
            .metadata
            .get_file_by_public_id(public_id.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound("file not found".to_string()))?;
        let record = FileRecord::try_from(row)?;
        let key = self.key_for(identity, &record)?;

        let meta = match timed(io_timeout, "stat stored file", self.storage.head(&key)).await {
            Ok(meta) => meta,
            Err(LifecycleError::Storage(e)) if e.is_not_found() => {
                tracing::warn!(key = %key, "Catalog entry without bytes at caller path");
                return Err(LifecycleError::NotFound("file not found".to_string()));
            }
            Err(e) => return Err(e),
        };
        let stream = timed(io_timeout, "open stored file", self.storage.get_stream(&key)).await?;

        tracing::debug!(size = meta.size, "Download started");
        Ok(Download {
            record,
            size: meta.size,
            stream,
        })
    }
}
