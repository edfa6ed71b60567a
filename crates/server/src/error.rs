//! API error types.

use crate::lifecycle::{ErrorKind, LifecycleError, QuotaScope};
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP status of a lifecycle outcome kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::QuotaExceeded => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Infected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ScanUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Corruption | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Multipart(_) => ErrorKind::InvalidInput.as_str(),
            Self::Lifecycle(e) => e.kind().as_str(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Lifecycle(e) => match e {
                LifecycleError::QuotaExceeded {
                    scope: QuotaScope::Host,
                    ..
                } => StatusCode::INSUFFICIENT_STORAGE,
                LifecycleError::QuotaExceeded {
                    scope: QuotaScope::Client,
                    ..
                } => StatusCode::PAYLOAD_TOO_LARGE,
                other => status_for(other.kind()),
            },
        }
    }

    /// Message shown to the client.
    ///
    /// Server-side failures are reported generically; their details only
    /// reach the log.
    fn public_message(&self) -> String {
        match self {
            Self::Lifecycle(e)
                if matches!(e.kind(), ErrorKind::Corruption | ErrorKind::Internal) =>
            {
                "internal server error".to_string()
            }
            Self::Lifecycle(LifecycleError::ScanUnavailable(_)) => {
                "the antivirus scan is unavailable, try again later".to_string()
            }
            Self::Multipart(e) => e.body_text(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        crate::metrics::record_error(self.code());

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_scopes_map_to_distinct_statuses() {
        let host = ApiError::from(LifecycleError::QuotaExceeded {
            scope: QuotaScope::Host,
            remaining: 0,
        });
        let client = ApiError::from(LifecycleError::QuotaExceeded {
            scope: QuotaScope::Client,
            remaining: 10,
        });
        assert_eq!(host.status_code(), StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(client.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(host.code(), "quota_exceeded");
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (LifecycleError::not_allowed(), StatusCode::BAD_REQUEST),
            (LifecycleError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                LifecycleError::Infected {
                    signature: "Eicar".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LifecycleError::ScanUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LifecycleError::NotFound("file".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                LifecycleError::Corruption("drift".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                LifecycleError::Timeout {
                    step: "store file".to_string(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = ApiError::from(LifecycleError::OrphanFile {
            identity: "abc".to_string(),
            file: "secret.txt".to_string(),
        });
        assert_eq!(err.code(), "corruption");
        assert_eq!(err.public_message(), "internal server error");
    }
}
