//! HTTP error responses.
//!
//! Maps [`verity_core::Error`] classes onto status codes and JSON bodies.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use verity_core::{Error, ErrorKind};

/// An error on its way out of an HTTP handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Anything the pipeline reported.
    #[error(transparent)]
    Pipeline(#[from] Error),

    /// Request body was not the JSON we expected.
    #[error("INVALID_INPUT: {0}")]
    MalformedBody(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: String,
    retry_after: u64,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(err) => match err.kind() {
                ErrorKind::Validation | ErrorKind::Extraction => StatusCode::BAD_REQUEST,
                ErrorKind::Throttle => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Message without the `CODE:` prefix.
fn caller_message(err: &Error) -> String {
    match err {
        Error::InvalidInput(msg) | Error::ExtractFailed(msg) => msg.clone(),
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ApiError::Pipeline(Error::RateLimited { retry_after_secs, limit, reset_at }) => {
                let body = RateLimitedBody {
                    error: "Too many requests".into(),
                    retry_after: retry_after_secs,
                    message: format!("Rate limit exceeded. Try again in {retry_after_secs} seconds."),
                };
                let mut response = (status, Json(body)).into_response();
                rate_limit_headers(response.headers_mut(), retry_after_secs, limit, reset_at);
                response
            }
            ApiError::Pipeline(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (status, Json(ErrorBody { error: caller_message(&err) })).into_response()
            }
            ApiError::MalformedBody(msg) => (status, Json(ErrorBody { error: msg })).into_response(),
        }
    }
}

fn rate_limit_headers(headers: &mut HeaderMap, retry_after_secs: u64, limit: u32, reset_at: DateTime<Utc>) {
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static("x-ratelimit-remaining"), HeaderValue::from_static("0"));
    match HeaderValue::from_str(&reset_at.to_rfc3339_opts(SecondsFormat::Millis, true)) {
        Ok(value) => {
            headers.insert(HeaderName::from_static("x-ratelimit-reset"), value);
        }
        Err(e) => tracing::warn!(error = %e, "skipping invalid reset header"),
    }
}
