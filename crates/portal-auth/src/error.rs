//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Identifier/secret pair was rejected
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Refresh requested without a stored refresh token
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The refresh exchange was rejected or could not complete
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The server rejected the bearer credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Server-side failure (non-auth status)
    #[error("Server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Malformed bearer token
    #[error("Malformed token: {0}")]
    Token(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] portal_storage::StorageError),

    /// HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Returns true if this error is transient (connectivity or 5xx),
    /// as opposed to a definitive rejection of the credentials.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            AuthError::Server { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
