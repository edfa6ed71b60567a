//! Lifecycle error types.

use moada_metadata::MetadataError;
use moada_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Message returned for every rejected upload input.
///
/// Disallowed types, malformed names and malformed emails share it; the
/// precise reason is only logged.
pub const NOT_ALLOWED_MESSAGE: &str = "The uploaded file is not allowed. You can try compressing it in .rar, .zip, or .tar format, for example.";

/// Which cap an upload ran into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaScope {
    Client,
    Host,
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaScope::Client => f.write_str("client"),
            QuotaScope::Host => f.write_str("host"),
        }
    }
}

/// Stable, machine-readable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    QuotaExceeded,
    RateLimited,
    Infected,
    ScanUnavailable,
    NotFound,
    /// Dedup hit: the upload is answered with the stored record.
    Conflict,
    Corruption,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Infected => "infected",
            ErrorKind::ScanUnavailable => "scan_unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Corruption => "corruption",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Client-fault input. The message is safe to return as-is.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{scope} quota exceeded, {remaining} bytes remaining")]
    QuotaExceeded { scope: QuotaScope, remaining: u64 },

    #[error("too many requests")]
    RateLimited,

    #[error("the uploaded file is infected ({signature})")]
    Infected { signature: String },

    #[error("antivirus scan unavailable: {0}")]
    ScanUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage inconsistency: {0}")]
    Corruption(String),

    #[error("orphan file {file} in directory of {identity}")]
    OrphanFile { identity: String, file: String },

    #[error("usage refresh failed after commit: {0}")]
    Ledger(Box<LifecycleError>),

    #[error("cannot read directory of {identity}: {source}")]
    DirectoryUnreadable {
        identity: String,
        #[source]
        source: StorageError,
    },

    #[error("{step} timed out")]
    Timeout { step: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),
}

impl LifecycleError {
    /// The error's category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Infected { .. } => ErrorKind::Infected,
            Self::ScanUnavailable(_) => ErrorKind::ScanUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Corruption(_) | Self::OrphanFile { .. } | Self::Ledger(_) => {
                ErrorKind::Corruption
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DirectoryUnreadable { .. } | Self::Storage(_) | Self::Metadata(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_allowed() -> Self {
        Self::InvalidInput(NOT_ALLOWED_MESSAGE.to_string())
    }

    pub(crate) fn timeout(step: &str) -> Self {
        Self::Timeout {
            step: step.to_string(),
        }
    }
}

impl From<MetadataError> for LifecycleError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Timeout(op) => Self::Timeout { step: op },
            other => Self::Metadata(other),
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_timeout_maps_to_timeout_kind() {
        let err = LifecycleError::from(MetadataError::Timeout("insert_file".to_string()));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "insert_file timed out");

        let err = LifecycleError::from(MetadataError::Internal("boom".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_corruption_is_distinct_from_not_found() {
        let orphan = LifecycleError::OrphanFile {
            identity: "abc".to_string(),
            file: "x.txt".to_string(),
        };
        let missing = LifecycleError::NotFound("file".to_string());
        assert_eq!(orphan.kind(), ErrorKind::Corruption);
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(
            LifecycleError::Ledger(Box::new(orphan)).kind(),
            ErrorKind::Corruption
        );
    }

    #[test]
    fn test_not_allowed_message_is_generic() {
        let err = LifecycleError::not_allowed();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.to_string(), NOT_ALLOWED_MESSAGE);
    }
}
