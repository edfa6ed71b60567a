//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use moada_core::{FileRecord, PrivateId, PublicId};
use serde::Serialize;
use time::OffsetDateTime;

/// Parse a required public identifier parameter.
pub fn require_public_id(value: Option<&str>) -> ApiResult<PublicId> {
    let value = required(value, "idPublic")?;
    PublicId::parse(value).map_err(|_| ApiError::BadRequest("invalid 'idPublic'".to_string()))
}

/// Parse a required private identifier parameter.
pub fn require_private_id(value: Option<&str>) -> ApiResult<PrivateId> {
    let value = required(value, "idPrivate")?;
    PrivateId::parse(value).map_err(|_| ApiError::BadRequest("invalid 'idPrivate'".to_string()))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("the '{name}' parameter was not provided")))
}

/// File fields safe to show to anyone holding the public identifier.
#[derive(Debug, Serialize)]
pub struct PublicFile {
    pub public_id: PublicId,
    pub name: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<FileRecord> for PublicFile {
    fn from(record: FileRecord) -> Self {
        Self {
            public_id: record.public_id,
            name: record.name,
            size: record.size,
            saved_at: record.saved_at,
            expires_at: record.expires_at,
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
