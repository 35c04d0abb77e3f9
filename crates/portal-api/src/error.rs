//! API error types.

use thiserror::Error;

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authorization failed and could not be recovered by a refresh
    #[error("Unauthorized")]
    Unauthorized,

    /// Server-side failure (non-auth status)
    #[error("Server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
