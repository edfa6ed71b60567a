use super::Lifecycle;
use super::error::{LifecycleError, LifecycleResult};
use moada_core::{ClientIdentity, ClientRecord, FileRecord, PrivateId};

impl Lifecycle {
    /// Full record of a file, for holders of its private identifier.
    pub async fn file_info(&self, private_id: &PrivateId) -> LifecycleResult<FileRecord> {
        let row = self
            .metadata
            .get_file_by_private_id(private_id.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound("file not found".to_string()))?;
        Ok(FileRecord::try_from(row)?)
    }

    /// The caller's client record.
    pub async fn client_info(&self, identity: &ClientIdentity) -> LifecycleResult<ClientRecord> {
        let row = self
            .metadata
            .get_client(identity.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound("client not found".to_string()))?;
        Ok(ClientRecord::try_from(row)?)
    }
}
