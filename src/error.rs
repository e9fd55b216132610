use std::fmt;
use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failure of a single upstream API call, before retry policy applies.
///
/// The variant decides retryability; the error is always propagated
/// unchanged so callers can still inspect the original status code.
#[derive(Debug)]
pub enum UpstreamError {
    /// Upstream responded with a non-success status.
    Status {
        status: StatusCode,
        body: Option<String>,
    },

    /// Transport-level failure: the request never produced a response.
    Network(reqwest::Error),

    /// Upstream responded but the body could not be decoded.
    Decode(String),
}

impl UpstreamError {
    /// Whether the retry executor may try this call again.
    ///
    /// Retryable: HTTP 429, any 5xx, and transient network failures
    /// (timeouts, connection errors, a peer that resets or hangs up
    /// mid-request). Everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            UpstreamError::Network(err) => {
                err.is_timeout() || err.is_connect() || connection_was_interrupted(err)
            }
            UpstreamError::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Status { status, .. } => {
                write!(f, "upstream responded with status {status}")
            }
            UpstreamError::Network(err) => write!(f, "upstream request failed: {err}"),
            UpstreamError::Decode(message) => write!(f, "upstream response not decodable: {message}"),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpstreamError::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Network(err)
    }
}

/// Looks down the error source chain for an established connection that
/// died under the request: an io-level reset/abort, or hyper reporting
/// that the peer closed the socket before completing the response.
fn connection_was_interrupted(err: &reqwest::Error) -> bool {
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper_err) = inner.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                return true;
            }
        }
        cause = std::error::Error::source(inner);
    }
    false
}

/// Request-level error surfaced to HTTP callers.
///
/// Client input problems keep their message; anything mapped to a 5xx is
/// logged in full but rendered with a generic message.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed Authorization header.
    Unauthorized(String),

    /// Invalid caller input, e.g. a bad date range.
    BadRequest(String),

    /// The upstream could not serve a required dependency of this request.
    BadGateway(String),

    /// An upstream call failed past the retry policy; surfaced with the
    /// upstream's own status when one exists, 502 otherwise.
    Upstream(UpstreamError),

    /// Anything unexpected.
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream(err) => err.status().unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(message) => write!(f, "{message}"),
            ApiError::BadRequest(message) => write!(f, "{message}"),
            ApiError::BadGateway(message) => write!(f, "{message}"),
            ApiError::Upstream(err) => write!(f, "{err}"),
            ApiError::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::Upstream(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 4xx messages pass through; 5xx details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "request failed");
            match status {
                StatusCode::BAD_GATEWAY => "Bad Gateway".to_string(),
                _ => "Internal Server Error".to_string(),
            }
        } else {
            tracing::warn!(error = %self, status = %status, "request rejected");
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
