//! Unified error types for verity.
//!
//! Every variant belongs to one of five classes (see [`ErrorKind`]), which
//! decides how the pipeline surfaces it: validation and throttling go back to
//! the caller, upstream and internal faults are absorbed into a fallback.

use chrono::{DateTime, Utc};
use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the verity service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or too-short input.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Content extraction failed.
    #[error("EXTRACT_FAILED: {0}")]
    ExtractFailed(String),

    /// Client exceeded its request window.
    #[error("RATE_LIMITED: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, limit: u32, reset_at: DateTime<Utc> },

    /// Every inference candidate failed.
    #[error("UPSTREAM_UNAVAILABLE: {0}")]
    UpstreamUnavailable(String),

    /// Unexpected fault.
    #[error("INTERNAL_ERROR: {0}")]
    Internal(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// SSRF blocked - private/internal address not allowed.
    #[error("SSRF_BLOCKED: {0}")]
    SsrfBlocked(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Response body is not a document we can read.
    #[error("UNSUPPORTED_CONTENT: {0}")]
    UnsupportedContent(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),
}

/// Caller-facing error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Extraction,
    Throttle,
    UpstreamUnavailable,
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::Validation,
            Error::ExtractFailed(_)
            | Error::InvalidUrl(_)
            | Error::SsrfBlocked(_)
            | Error::FetchTimeout(_)
            | Error::FetchTooLarge(_)
            | Error::UnsupportedContent(_)
            | Error::HttpError(_) => ErrorKind::Extraction,
            Error::RateLimited { .. } => ErrorKind::Throttle,
            Error::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::Internal(_) | Error::Database(_) | Error::MigrationFailed(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller should see this as a bad request.
    pub fn is_validation_class(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Extraction)
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization failed: {err}"))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::ExtractFailed(_) => -32000,
            Error::RateLimited { .. } => -32010,
            Error::UpstreamUnavailable(_) => -32011,
            Error::Internal(_) => -32603,
            Error::Database(_) | Error::MigrationFailed(_) => -32002,
            Error::InvalidUrl(_) => -32003,
            Error::SsrfBlocked(_) => -32004,
            Error::FetchTimeout(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::UnsupportedContent(_) => -32009,
            Error::HttpError(_) => -32008,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("text too short".to_string());
        assert!(err.to_string().contains("INVALID_INPUT"));
        assert!(err.to_string().contains("text too short"));
    }

    #[test]
    fn test_rate_limited_display() {
        let err = Error::RateLimited { retry_after_secs: 42, limit: 10, reset_at: Utc::now() };
        assert_eq!(err.to_string(), "RATE_LIMITED: retry after 42s");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidInput(String::new()).kind(), ErrorKind::Validation);
        assert_eq!(Error::FetchTimeout(String::new()).kind(), ErrorKind::Extraction);
        assert_eq!(Error::SsrfBlocked(String::new()).kind(), ErrorKind::Extraction);
        assert_eq!(Error::UpstreamUnavailable(String::new()).kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(Error::MigrationFailed(String::new()).kind(), ErrorKind::Internal);
        assert!(Error::HttpError("status 404".into()).is_validation_class());
        assert!(!Error::Internal("boom".into()).is_validation_class());
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::RateLimited { retry_after_secs: 5, limit: 10, reset_at: Utc::now() };
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32010);
    }
}
