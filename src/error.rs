//! Error types for X API operations.
//!
//! Every failure the core can produce is one variant of [`ApiError`]. The
//! variants separate failures that happen before any network call
//! (configuration, validation) from failures reported by the platform
//! (rate limiting, rejections, malformed payloads) and from local or
//! transport problems, so the HTTP layer can map each one to a status code.

use axum::http::StatusCode;
use thiserror::Error;

/// A failed X API operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or empty credentials, or an endpoint that cannot be parsed.
    ///
    /// Raised before any network call is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or invalid input, rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// HTTP 429 on every allowed attempt, or platform error code 88.
    #[error("rate limited by the X API after {attempts} attempt(s)")]
    RateLimited {
        /// Number of attempts issued before giving up.
        attempts: u32,
    },

    /// Any other non-2xx response. Never retried.
    #[error("X API rejected the request (HTTP {status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    /// Network, DNS or timeout failure before a response was received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A 2xx response that lacks the fields the operation needs.
    #[error("malformed response from the X API: {0}")]
    MalformedResponse(String),

    /// The caller's cancellation token fired or its deadline elapsed.
    #[error("operation cancelled")]
    Cancelled,

    /// Local file I/O failed while staging media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status the service answers with when an operation fails this way.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamRejected { .. }
            | ApiError::Transport(_)
            | ApiError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            ApiError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}
