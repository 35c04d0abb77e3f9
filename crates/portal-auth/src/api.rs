//! REST auth API client.
//!
//! Login, registration and refresh deliberately live outside the gated
//! API client: a refresh triggered by a 401 must never itself pass
//! through the 401-retry pipeline.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Authenticated identity as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User UUID
    pub id: String,
    /// Role name (e.g. admin, staff, student)
    pub role: String,
    /// Granted permission names
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Identity {
    /// Whether this identity holds any of the given roles.
    pub fn has_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| *r == self.role)
    }

    /// Whether this identity holds the given permission.
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }
}

/// Token material returned by login, registration and refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub identity: Identity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
    remember: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Server-facing auth operations.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn login(&self, identifier: &str, secret: &str, remember: bool)
        -> AuthResult<TokenPair>;

    /// Create an account and receive a token pair.
    async fn register(&self, payload: serde_json::Value) -> AuthResult<TokenPair>;

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair>;

    /// Fetch the identity behind an access token.
    async fn me(&self, access_token: &str) -> AuthResult<Identity>;
}

/// REST implementation of [`AuthApi`].
#[derive(Clone)]
pub struct RestAuthApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestAuthApi {
    /// Create a new auth API client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.portal.app`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AuthApi for RestAuthApi {
    async fn login(
        &self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> AuthResult<TokenPair> {
        let url = self.endpoint("/auth/login");
        tracing::debug!(url = %url, identifier = %identifier, "Attempting login");

        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest {
                identifier,
                secret,
                remember,
            })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Login rejected");
            return Err(AuthError::InvalidCredentials(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Login failed");
            return Err(AuthError::Server {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn register(&self, payload: serde_json::Value) -> AuthResult<TokenPair> {
        let url = self.endpoint("/auth/register");
        tracing::debug!(url = %url, "Attempting registration");

        let response = self.http_client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Registration rejected");
            return Err(AuthError::InvalidCredentials(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Registration failed");
            return Err(AuthError::Server {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let url = self.endpoint("/auth/refresh");
        tracing::debug!(url = %url, "Refreshing token");

        let response = self
            .http_client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Token refresh rejected");
            return Err(AuthError::RefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn me(&self, access_token: &str) -> AuthResult<Identity> {
        let url = self.endpoint("/users/me");
        tracing::debug!(url = %url, "Fetching current identity");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Identity fetch failed");
            return Err(AuthError::Server {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
