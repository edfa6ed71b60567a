//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use moada_core::{ClientIdentity, ClientRecord, FileRecord, PrivateId, PublicId};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// File catalog
// =============================================================================

/// Catalog entry for a stored file.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub public_id: String,
    pub private_id: String,
    pub name: String,
    pub size: i64,
    pub saved_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub email: Option<String>,
}

impl From<&FileRecord> for FileRow {
    fn from(record: &FileRecord) -> Self {
        Self {
            public_id: record.public_id.to_string(),
            private_id: record.private_id.to_string(),
            name: record.name.clone(),
            size: i64::try_from(record.size).unwrap_or(i64::MAX),
            saved_at: record.saved_at,
            expires_at: record.expires_at,
            email: record.email.clone(),
        }
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = MetadataError;

    fn try_from(row: FileRow) -> MetadataResult<Self> {
        Ok(Self {
            public_id: PublicId::parse(&row.public_id).map_err(corrupt_row)?,
            private_id: PrivateId::parse(&row.private_id).map_err(corrupt_row)?,
            name: row.name,
            size: u64::try_from(row.size)
                .map_err(|_| MetadataError::Internal(format!("negative file size {}", row.size)))?,
            saved_at: row.saved_at,
            expires_at: row.expires_at,
            email: row.email,
        })
    }
}

// =============================================================================
// Client records
// =============================================================================

/// Anonymous client record. `files` holds a JSON array of public ids.
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub identity: String,
    pub files: String,
    pub files_count: i64,
    pub used_space: i64,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub api_calls: i64,
    pub last_call_at: OffsetDateTime,
}

impl ClientRow {
    /// Decode the stored public id list.
    pub fn file_ids(&self) -> MetadataResult<Vec<String>> {
        serde_json::from_str(&self.files)
            .map_err(|e| MetadataError::Internal(format!("invalid files list: {e}")))
    }
}

impl TryFrom<ClientRow> for ClientRecord {
    type Error = MetadataError;

    fn try_from(row: ClientRow) -> MetadataResult<Self> {
        let files = row
            .file_ids()?
            .iter()
            .map(|id| PublicId::parse(id).map_err(corrupt_row))
            .collect::<MetadataResult<Vec<_>>>()?;

        Ok(Self {
            identity: ClientIdentity::parse(&row.identity).map_err(corrupt_row)?,
            files,
            files_count: u64::try_from(row.files_count).unwrap_or_default(),
            used_space: u64::try_from(row.used_space).unwrap_or_default(),
            created_at: row.created_at,
            expires_at: row.expires_at,
            api_calls: u32::try_from(row.api_calls).unwrap_or(u32::MAX),
            last_call_at: row.last_call_at,
        })
    }
}

/// Encode public ids as the JSON array stored in `clients.files`.
pub fn encode_file_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> MetadataResult<String> {
    let ids: Vec<&str> = ids.into_iter().collect();
    serde_json::to_string(&ids)
        .map_err(|e| MetadataError::Internal(format!("failed to encode files list: {e}")))
}

fn corrupt_row(e: moada_core::Error) -> MetadataError {
    MetadataError::Internal(format!("corrupt row: {e}"))
}
