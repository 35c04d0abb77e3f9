//! Request and transport types for the gated client.

use crate::ApiResult;
use async_trait::async_trait;
use reqwest::Method;

/// A fully-resolved outbound request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

/// A raw response; typed decoding happens in the client.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// One logical call through the gate, carrying its retry state
/// explicitly instead of as a flag smuggled onto a transport object.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    attempt: u8,
}

impl RequestAttempt {
    /// The initial attempt of a request.
    pub fn first(method: Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            attempt: 0,
        }
    }

    /// The single permitted retry of this request.
    pub fn retry(&self) -> Self {
        Self {
            method: self.method.clone(),
            path: self.path.clone(),
            body: self.body.clone(),
            attempt: 1,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolve against the API root with the given bearer credential.
    pub fn to_request(&self, base_url: &str, bearer: Option<String>) -> ApiRequest {
        ApiRequest {
            method: self.method.clone(),
            url: format!("{}{}", base_url.trim_end_matches('/'), self.path),
            body: self.body.clone(),
            bearer,
        }
    }
}

/// Transport seam behind the gate.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a request and return the raw response.
    ///
    /// Only connection-level failures are errors; every HTTP status
    /// comes back as a response so the gate can decide what to do.
    async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse>;
}

/// Production transport on reqwest.
#[derive(Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let mut builder = self.client.request(request.method, &request.url);

        if let Some(bearer) = &request.bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(ApiResponse { status, body })
    }
}
