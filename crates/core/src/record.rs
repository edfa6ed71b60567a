//! File and client records.

use crate::file_id::{PrivateId, PublicId};
use crate::identity::ClientIdentity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Catalog entry for a stored file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Identifier used to retrieve the file.
    pub public_id: PublicId,
    /// Identifier that authorizes deletion.
    pub private_id: PrivateId,
    /// Original display name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// When the file was saved.
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    /// Record expiry (`saved_at` + record TTL).
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Optional contact address supplied by the uploader.
    pub email: Option<String>,
}

/// Anonymous client state, keyed by identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub identity: ClientIdentity,
    /// Public identifiers of the files in the client's directory.
    pub files: Vec<PublicId>,
    pub files_count: u64,
    /// Bytes used, derived from the directory contents and the catalog.
    pub used_space: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Calls counted in the current rate-limit window.
    pub api_calls: u32,
    /// Start of the current rate-limit window.
    #[serde(with = "time::serde::rfc3339")]
    pub last_call_at: OffsetDateTime,
}

/// A recomputed view of a client's storage usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub files: Vec<PublicId>,
    pub files_count: u64,
    pub used_space: u64,
}

impl Usage {
    /// Build a usage snapshot from `(id, size)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (PublicId, u64)>) -> Self {
        let mut usage = Self::default();
        for (id, size) in entries {
            usage.files.push(id);
            usage.used_space += size;
        }
        usage.files_count = usage.files.len() as u64;
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_id::{FileIds, Secrets};
    use time::macros::datetime;

    #[test]
    fn test_usage_counts_match() {
        let secrets = Secrets::new("p", "e");
        let a = FileIds::derive(b"a", "a.txt", &secrets).public;
        let b = FileIds::derive(b"bb", "b.txt", &secrets).public;

        let usage = Usage::from_entries([(a.clone(), 1), (b.clone(), 2)]);
        assert_eq!(usage.files, vec![a, b]);
        assert_eq!(usage.files_count, 2);
        assert_eq!(usage.used_space, 3);
    }

    #[test]
    fn test_file_record_json_shape() {
        let secrets = Secrets::new("p", "e");
        let ids = FileIds::derive(b"x", "x.txt", &secrets);
        let record = FileRecord {
            public_id: ids.public.clone(),
            private_id: ids.private,
            name: "x.txt".to_string(),
            size: 1,
            saved_at: datetime!(2025-01-01 00:00 UTC),
            expires_at: datetime!(2025-01-02 00:00 UTC),
            email: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["public_id"], ids.public.as_str());
        assert_eq!(json["expires_at"], "2025-01-02T00:00:00Z");

        let back: FileRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
