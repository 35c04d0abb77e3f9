//! Notification error types.

use thiserror::Error;

/// Notification error type.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// REST call through the gate failed
    #[error("API error: {0}")]
    Api(#[from] portal_api::ApiError),

    /// Push payload did not decode
    #[error("Malformed push payload: {0}")]
    Payload(String),
}

/// Result type alias using NotifyError.
pub type NotifyResult<T> = Result<T, NotifyError>;
