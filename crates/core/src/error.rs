//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("content type not allowed: {0}")]
    DisallowedContentType(String),

    #[error("invalid email: {0}")]
    InvalidEmail(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
