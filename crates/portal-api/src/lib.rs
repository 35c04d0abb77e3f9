//! Gated API client for the portal backend.
//!
//! Every protected REST call goes through [`ApiClient`], which attaches
//! the current bearer token and, on an authorization failure, joins the
//! session's single refresh exchange and retries the call exactly once.

mod client;
mod error;
mod request;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use request::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, RequestAttempt};
