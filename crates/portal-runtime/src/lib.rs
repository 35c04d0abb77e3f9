//! Client runtime: wires the session, gate, channel and notification
//! reconciler together with an explicit lifecycle.
//!
//! Everything is constructor-injected so tests (and embedders) can
//! assemble isolated instances; there are no ambient singletons.

mod config;
mod telemetry;

pub use config::PortalConfig;
pub use telemetry::init_logging;

use portal_api::ApiClient;
use portal_auth::{AuthResult, AuthState, Identity, RestAuthApi, SessionManager};
use portal_notifications::{
    AlertSink, LogAlertSink, NotificationApi, NotificationCenter, PushEvent, RestNotificationApi,
};
use portal_realtime::{ChannelManager, ChannelState, EventKind, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Redirect bookkeeping for forced logouts.
struct RedirectState {
    current_route: Mutex<Option<String>>,
    login_redirect: Mutex<Option<String>>,
    /// Set just before a user-initiated logout so the state callback
    /// can tell it apart from a session expiring underneath the user.
    explicit_logout: AtomicBool,
    last_state: Mutex<AuthState>,
}

impl Default for RedirectState {
    fn default() -> Self {
        Self {
            current_route: Mutex::new(None),
            login_redirect: Mutex::new(None),
            explicit_logout: AtomicBool::new(false),
            last_state: Mutex::new(AuthState::NotLoggedIn),
        }
    }
}

/// The portal client core.
///
/// Owns one session, one gated API client, one notification reconciler
/// and at most one live realtime channel. UI layers read through the
/// accessors; they never mutate internal state directly.
pub struct PortalClient {
    config: PortalConfig,
    session: SessionManager,
    api: ApiClient,
    notifications: Arc<NotificationCenter>,
    channel: Arc<Mutex<Option<ChannelManager>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    redirect: Arc<RedirectState>,
}

impl PortalClient {
    /// Assemble the production client: file-backed credential store,
    /// REST auth API and notification API, log-only alert sink.
    pub fn new(config: PortalConfig) -> Result<Self, portal_storage::StorageError> {
        let credentials = portal_storage::create_credential_store()?;
        let auth_api = Arc::new(RestAuthApi::new(&config.api_base_url));
        let session = SessionManager::new(credentials, auth_api);
        let api = ApiClient::new(session.clone(), &config.api_base_url);
        let notification_api: Arc<dyn NotificationApi> =
            Arc::new(RestNotificationApi::new(api.clone()));

        Ok(Self::with_components(
            config,
            session,
            api,
            notification_api,
            Arc::new(LogAlertSink),
        ))
    }

    /// Assemble a client from explicit parts.
    pub fn with_components(
        config: PortalConfig,
        session: SessionManager,
        api: ApiClient,
        notification_api: Arc<dyn NotificationApi>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let notifications = Arc::new(NotificationCenter::new(notification_api, alerts));
        let channel: Arc<Mutex<Option<ChannelManager>>> = Arc::new(Mutex::new(None));
        let redirect = Arc::new(RedirectState::default());

        // Watch the session for a forced end: a session that dies while
        // the user is somewhere keeps that route for the post-login
        // redirect, and its channel must not outlive it.
        {
            let redirect = redirect.clone();
            let channel = channel.clone();
            session.set_state_callback(Box::new(move |payload| {
                let previous = {
                    let mut last = redirect.last_state.lock().unwrap();
                    std::mem::replace(&mut *last, payload.state.clone())
                };

                if payload.state != AuthState::NotLoggedIn {
                    return;
                }

                let explicit = redirect.explicit_logout.swap(false, Ordering::SeqCst);
                let had_session =
                    matches!(previous, AuthState::LoggedIn | AuthState::Refreshing);
                if explicit || !had_session {
                    return;
                }

                info!("Session ended without an explicit logout");
                let route = redirect.current_route.lock().unwrap().clone();
                if let Some(route) = route {
                    *redirect.login_redirect.lock().unwrap() = Some(route);
                }
                if let Some(channel) = channel.lock().unwrap().take() {
                    channel.close();
                }
            }));
        }

        Self {
            config,
            session,
            api,
            notifications,
            channel,
            subscriptions: Mutex::new(Vec::new()),
            redirect,
        }
    }

    /// Bring the client up on process start.
    ///
    /// Runs the session bootstrap (refreshing an expired persisted
    /// token before anything is marked ready), then, when a session
    /// exists, loads the notification baseline and opens the channel —
    /// in that order, so the badge is correct even if the channel
    /// connects late.
    ///
    /// Returns whether the client came up authenticated.
    pub async fn init(&self) -> AuthResult<bool> {
        let authenticated = self.session.bootstrap().await?;

        if authenticated {
            if let Err(e) = self.notifications.bootstrap().await {
                warn!(error = %e, "Notification baseline fetch failed");
            }
            self.start_realtime().await;
        }

        Ok(authenticated)
    }

    /// Login and rebuild the realtime side for the new session.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> AuthResult<Identity> {
        let identity = self.session.login(identifier, secret, remember).await?;

        if let Err(e) = self.notifications.bootstrap().await {
            warn!(error = %e, "Notification baseline fetch failed");
        }
        self.start_realtime().await;

        Ok(identity)
    }

    /// Register and establish the new session like a login.
    pub async fn register(&self, payload: serde_json::Value) -> AuthResult<Identity> {
        let identity = self.session.register(payload).await?;

        if let Err(e) = self.notifications.bootstrap().await {
            warn!(error = %e, "Notification baseline fetch failed");
        }
        self.start_realtime().await;

        Ok(identity)
    }

    /// User-initiated logout: closes the channel, clears the session.
    /// Idempotent.
    pub fn logout(&self) -> AuthResult<()> {
        self.redirect.explicit_logout.store(true, Ordering::SeqCst);
        if let Some(channel) = self.channel.lock().unwrap().take() {
            channel.close();
        }
        let result = self.session.logout();
        // If the session was already gone no state change fired; do not
        // leave the flag armed for a later forced end.
        self.redirect.explicit_logout.store(false, Ordering::SeqCst);
        result
    }

    /// Tear the client down without touching persisted credentials.
    pub fn dispose(&self) {
        if let Some(channel) = self.channel.lock().unwrap().take() {
            channel.close();
        }
        self.subscriptions.lock().unwrap().clear();
        info!("Client disposed");
    }

    /// Record the route the user is currently on; consumed if the
    /// session ends underneath them.
    pub fn set_current_route(&self, route: &str) {
        *self.redirect.current_route.lock().unwrap() = Some(route.to_string());
    }

    /// Take the destination preserved by a forced logout, if any.
    pub fn take_login_redirect(&self) -> Option<String> {
        self.redirect.login_redirect.lock().unwrap().take()
    }

    /// The session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The gated API client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The notification reconciler.
    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    /// State of the live channel, if one exists.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.channel.lock().unwrap().as_ref().map(|c| c.state())
    }

    /// Tear down any previous channel and connect a fresh one wired
    /// into the reconciler. One live connection per session, always
    /// handshaking with whatever token the session currently holds.
    async fn start_realtime(&self) {
        if let Some(previous) = self.channel.lock().unwrap().take() {
            previous.close();
        }

        let channel = ChannelManager::new(self.config.channel.clone(), self.session.clone());

        let mut subscriptions = Vec::new();
        for kind in [
            EventKind::NewNotification,
            EventKind::NotificationRead,
            EventKind::NotificationDeleted,
            EventKind::UnreadCount,
        ] {
            let notifications = self.notifications.clone();
            subscriptions.push(channel.on(kind, move |event| {
                match PushEvent::from_server_event(event) {
                    Ok(Some(push)) => notifications.apply_event(push),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Dropping undecodable push event"),
                }
            }));
        }

        {
            let mut slot = self.subscriptions.lock().unwrap();
            slot.clear();
            slot.extend(subscriptions);
        }
        *self.channel.lock().unwrap() = Some(channel.clone());

        channel.connect().await;
    }
}
