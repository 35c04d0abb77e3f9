//! The request gate.

use crate::{ApiError, ApiResponse, ApiResult, HttpTransport, ReqwestTransport, RequestAttempt};
use portal_auth::SessionManager;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Gated API client.
///
/// Wraps every protected call with two policies:
/// 1. pre-send: attach the current access token when a valid one exists;
/// 2. post-receive: on a 401, join the session's single refresh
///    exchange and resend the call exactly once with the new token.
///
/// Auth endpoints never pass through here (they live on
/// [`portal_auth::AuthApi`]), so a refresh can never recurse into
/// another refresh.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    session: SessionManager,
    base_url: String,
}

impl ApiClient {
    /// Create a client over the production reqwest transport.
    pub fn new(session: SessionManager, base_url: impl Into<String>) -> Self {
        Self::with_transport(session, base_url, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        session: SessionManager,
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The session this gate reads tokens from.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self
            .execute(RequestAttempt::first(Method::GET, path, None))
            .await?;
        decode(response)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .execute(RequestAttempt::first(Method::POST, path, Some(body)))
            .await?;
        decode(response)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .execute(RequestAttempt::first(Method::PUT, path, Some(body)))
            .await?;
        decode(response)
    }

    pub async fn delete<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .execute(RequestAttempt::first(Method::DELETE, path, Some(body)))
            .await?;
        decode(response)
    }

    /// Run one gated request to completion.
    async fn execute(&self, attempt: RequestAttempt) -> ApiResult<ApiResponse> {
        let bearer = self.session.current_access_token();
        let response = self
            .transport
            .execute(attempt.to_request(&self.base_url, bearer))
            .await?;

        if !response.is_unauthorized() || attempt.is_retry() {
            return finalize(response);
        }

        // Authorization failure on a fresh attempt: coordinate a single
        // refresh across however many requests are failing right now.
        debug!(path = %attempt.path(), "Authorization failure, joining refresh");
        match self.session.refresh().await {
            Ok(token) => {
                let retry = attempt.retry();
                let response = self
                    .transport
                    .execute(retry.to_request(&self.base_url, Some(token)))
                    .await?;
                finalize(response)
            }
            Err(e) => {
                warn!(path = %attempt.path(), error = %e, "Refresh failed, session is over");
                let _ = self.session.logout();
                Err(ApiError::Unauthorized)
            }
        }
    }
}

fn finalize(response: ApiResponse) -> ApiResult<ApiResponse> {
    if response.is_success() {
        return Ok(response);
    }
    if response.is_unauthorized() {
        return Err(ApiError::Unauthorized);
    }
    Err(ApiError::Server {
        status: response.status,
        body: response.body,
    })
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> ApiResult<T> {
    // Empty bodies (204s and bare-200 mutations) decode as JSON null so
    // unit and Option targets work.
    if response.body.trim().is_empty() {
        return Ok(serde_json::from_str("null")?);
    }
    Ok(serde_json::from_str(&response.body)?)
}
