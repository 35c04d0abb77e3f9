//! Shared harness for runtime integration tests.
//!
//! Provides a scripted auth API + REST transport pair that share one
//! notion of "the token the server currently accepts", plus a local
//! WebSocket server for the realtime side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{SinkExt, StreamExt};
use portal_api::{ApiClient, ApiRequest, ApiResponse, ApiResult, HttpTransport};
use portal_auth::{AuthApi, AuthError, AuthResult, Identity, SessionManager, TokenPair};
use portal_notifications::{LogAlertSink, NotificationApi, RestNotificationApi};
use portal_realtime::ChannelConfig;
use portal_runtime::{PortalClient, PortalConfig};
use portal_storage::{CredentialStore, MemoryStorage};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

pub fn make_token(suffix: i64) -> String {
    let exp =
        (Utc::now() + ChronoDuration::hours(1) + ChronoDuration::seconds(suffix)).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
    format!("{}.{}.sig", header, payload)
}

pub fn expired_token() -> String {
    let exp = (Utc::now() - ChronoDuration::hours(1)).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
    format!("{}.{}.sig", header, payload)
}

/// Server-side view shared by the auth API and the REST transport.
pub struct ServerState {
    pub valid_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub baseline_unread: AtomicU64,
    minted: AtomicUsize,
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(make_token(0)),
            refresh_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            baseline_unread: AtomicU64::new(0),
            minted: AtomicUsize::new(0),
        })
    }

    fn mint(&self) -> String {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) as i64;
        let token = make_token(100 + n);
        *self.valid_token.lock().unwrap() = token.clone();
        token
    }

    pub fn expire_session(&self) {
        *self.valid_token.lock().unwrap() = "rotated-away".to_string();
    }
}

fn identity() -> Identity {
    Identity {
        id: "user-1".to_string(),
        role: "staff".to_string(),
        permissions: vec!["documents.read".to_string()],
    }
}

pub struct MockAuthApi {
    server: Arc<ServerState>,
}

#[async_trait::async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _: &str, secret: &str, _: bool) -> AuthResult<TokenPair> {
        if secret == "wrong" {
            return Err(AuthError::InvalidCredentials("rejected".to_string()));
        }
        Ok(TokenPair {
            access_token: self.server.mint(),
            refresh_token: Some("refresh-0".to_string()),
            identity: identity(),
        })
    }

    async fn register(&self, _: serde_json::Value) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.server.mint(),
            refresh_token: Some("refresh-0".to_string()),
            identity: identity(),
        })
    }

    async fn refresh(&self, _: &str) -> AuthResult<TokenPair> {
        self.server.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::RefreshFailed("HTTP 401: invalid".to_string()));
        }
        Ok(TokenPair {
            access_token: self.server.mint(),
            refresh_token: None,
            identity: identity(),
        })
    }

    async fn me(&self, access_token: &str) -> AuthResult<Identity> {
        let valid = self.server.valid_token.lock().unwrap().clone();
        if access_token != valid {
            return Err(AuthError::Unauthorized);
        }
        Ok(identity())
    }
}

/// REST transport accepting only the server's current token.
pub struct MockRestTransport {
    server: Arc<ServerState>,
    pub requests: Mutex<Vec<ApiRequest>>,
}

#[async_trait::async_trait]
impl HttpTransport for MockRestTransport {
    async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let valid = self.server.valid_token.lock().unwrap().clone();
        if request.bearer.as_deref() != Some(valid.as_str()) {
            return Ok(ApiResponse {
                status: 401,
                body: String::new(),
            });
        }

        let body = if request.url.ends_with("/notifications/unread-count") {
            format!(
                r#"{{"unreadCount":{}}}"#,
                self.server.baseline_unread.load(Ordering::SeqCst)
            )
        } else {
            r#"{"ok":true}"#.to_string()
        };

        Ok(ApiResponse { status: 200, body })
    }
}

/// Spawn a channel server on an ephemeral port: accepts the handshake,
/// pushes the given frames, then holds the connection open.
pub async fn spawn_ws_server(push_frames: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));

    let accepts_clone = accepts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accepts_clone.fetch_add(1, Ordering::SeqCst);

            let push_frames = push_frames.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };

                match ws.next().await {
                    Some(Ok(Message::Text(_))) => {}
                    _ => return,
                }
                if ws
                    .send(Message::Text(
                        r#"{"type":"auth_result","success":true}"#.into(),
                    ))
                    .await
                    .is_err()
                {
                    return;
                }

                for frame in push_frames {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }

                while let Some(frame) = ws.next().await {
                    if frame.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (format!("ws://{}", addr), accepts)
}

pub struct Harness {
    pub client: PortalClient,
    pub server: Arc<ServerState>,
    pub transport: Arc<MockRestTransport>,
    pub ws_accepts: Arc<AtomicUsize>,
}

#[derive(Default)]
pub struct HarnessOptions {
    /// Frames the channel server pushes after the handshake.
    pub push_frames: Vec<String>,
    /// Pre-seeded persisted tokens, as if from an earlier run.
    pub seed_access_token: Option<String>,
    pub seed_refresh_token: Option<String>,
    /// What `/notifications/unread-count` reports.
    pub baseline_unread: u64,
}

pub async fn build_harness(options: HarnessOptions) -> Harness {
    portal_runtime::init_logging("warn");

    let server = ServerState::new();
    server
        .baseline_unread
        .store(options.baseline_unread, Ordering::SeqCst);

    let (ws_url, ws_accepts) = spawn_ws_server(options.push_frames).await;

    let credentials = CredentialStore::new(Box::new(MemoryStorage::new()));
    if let Some(token) = &options.seed_access_token {
        credentials.set_access_token(token).unwrap();
    }
    if let Some(token) = &options.seed_refresh_token {
        credentials.set_refresh_token(token).unwrap();
    }

    let session = SessionManager::new(
        credentials,
        Arc::new(MockAuthApi {
            server: server.clone(),
        }),
    );

    let transport = Arc::new(MockRestTransport {
        server: server.clone(),
        requests: Mutex::new(Vec::new()),
    });
    let api = ApiClient::with_transport(session.clone(), "https://api.portal.app", transport.clone());

    let config = PortalConfig {
        api_base_url: "https://api.portal.app".to_string(),
        channel: ChannelConfig {
            url: ws_url,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(200),
            reconnect_max_delay: Duration::from_millis(400),
        },
    };

    let notification_api: Arc<dyn NotificationApi> =
        Arc::new(RestNotificationApi::new(api.clone()));

    let client = PortalClient::with_components(
        config,
        session,
        api,
        notification_api,
        Arc::new(LogAlertSink),
    );

    Harness {
        client,
        server,
        transport,
        ws_accepts,
    }
}

pub async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..150 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Timed out waiting for {}", what);
}
