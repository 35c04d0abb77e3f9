//! Unverified JWT payload decoding.
//!
//! The client never verifies signatures (that is the server's job); it
//! only reads the `exp` claim so expiry can be checked lazily without a
//! background timer.

use crate::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Tokens within this many seconds of expiry are treated as expired, so
/// a request started "just in time" does not land server-side with a
/// dead credential.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Decode the expiry claim from a JWT without verifying it.
pub fn decode_expiry(token: &str) -> AuthResult<DateTime<Utc>> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Token("Not a JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Token(format!("Invalid payload encoding: {}", e)))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Token(format!("Invalid claims: {}", e)))?;

    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| AuthError::Token(format!("Out-of-range exp claim: {}", claims.exp)))
}

/// Check whether a token is expired (or close enough to count).
///
/// A token we cannot decode is reported expired rather than trusted.
pub fn is_expired(token: &str) -> bool {
    match decode_expiry(token) {
        Ok(expires_at) => {
            let remaining = expires_at.signed_duration_since(Utc::now());
            remaining.num_seconds() < EXPIRY_SKEW_SECS
        }
        Err(e) => {
            tracing::warn!(error = %e, "Treating undecodable access token as expired");
            true
        }
    }
}
