//! Session management with single-flight token refresh.
//!
//! The `SessionManager` owns the persisted token pair and the in-memory
//! identity, and tracks lifecycle state in an explicit FSM. Everything
//! else in the workspace reads tokens through it; nothing else writes
//! them.

use crate::fsm::{AuthMachine, AuthMachineInput, AuthState, AuthStateCallback};
use crate::{jwt, AuthApi, AuthError, AuthResult, Identity, SingleFlight, TokenPair};
use futures_util::FutureExt;
use portal_storage::CredentialStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Snapshot of session state for status reporting.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub state: AuthState,
}

/// Shared refresh outcome; `Arc` so every joiner can clone the error.
type RefreshOutcome = Result<String, Arc<AuthError>>;

struct SessionInner {
    credentials: CredentialStore,
    api: Arc<dyn AuthApi>,
    fsm: Mutex<AuthMachine>,
    identity: Mutex<Option<Identity>>,
    /// Refresh token for sessions that opted out of persistence.
    volatile_refresh_token: Mutex<Option<String>>,
    /// Whether the current session persists its refresh token.
    remembered: AtomicBool,
    /// Bumped on login/logout; a refresh settling under a stale epoch
    /// must not resurrect the session it belonged to.
    epoch: AtomicU64,
    refresh_flight: SingleFlight<RefreshOutcome>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

/// Session manager for the portal client.
///
/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Create a new session manager over a credential store and an auth
    /// API implementation.
    pub fn new(credentials: CredentialStore, api: Arc<dyn AuthApi>) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);

        Self {
            inner: Arc::new(SessionInner {
                credentials,
                api,
                fsm: Mutex::new(AuthMachine::new()),
                identity: Mutex::new(None),
                volatile_refresh_token: Mutex::new(None),
                remembered: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                refresh_flight: SingleFlight::new(),
                ready_tx,
                ready_rx,
                state_callback: Mutex::new(None),
            }),
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        let mut cb = self.inner.state_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Current FSM state.
    pub fn state(&self) -> AuthState {
        let fsm = self.inner.fsm.lock().unwrap();
        AuthState::from(fsm.state())
    }

    /// Whether the startup bootstrap has completed (success or failure).
    ///
    /// Protected UI must not render before this turns true.
    pub fn ready(&self) -> bool {
        *self.inner.ready_rx.borrow()
    }

    /// Watch the ready flag.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.inner.ready_rx.clone()
    }

    /// The access token, if one is held and not expired.
    pub fn current_access_token(&self) -> Option<String> {
        let token = self.inner.credentials.get_access_token().ok().flatten()?;
        if jwt::is_expired(&token) {
            return None;
        }
        Some(token)
    }

    /// The current identity, if authenticated.
    ///
    /// `None` as soon as the access token lapses, without waiting for a
    /// background timer: expiry is validated on read.
    pub fn identity(&self) -> Option<Identity> {
        self.current_access_token()?;
        self.inner.identity.lock().unwrap().clone()
    }

    /// Whether an unexpired session is held.
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Whether the current identity holds any of the given roles.
    /// `false` when unauthenticated, never an error.
    pub fn has_role(&self, roles: &[&str]) -> bool {
        self.identity().map_or(false, |i| i.has_role(roles))
    }

    /// Whether the current identity holds the given permission.
    /// `false` when unauthenticated, never an error.
    pub fn has_permission(&self, name: &str) -> bool {
        self.identity().map_or(false, |i| i.has_permission(name))
    }

    /// Status snapshot for UI/status consumers.
    pub fn snapshot(&self) -> SessionSnapshot {
        let identity = self.identity();
        SessionSnapshot {
            authenticated: identity.is_some(),
            user_id: identity.as_ref().map(|i| i.id.clone()),
            role: identity.as_ref().map(|i| i.role.clone()),
            state: self.state(),
        }
    }

    /// Validate a persisted session on startup.
    ///
    /// - no persisted token: resolves unauthenticated
    /// - expired token: refresh before the session is marked ready
    /// - valid token: optimistically authenticated, identity fetched
    ///   from the server, falling back to logout on rejection
    ///
    /// Auth failures are recovered locally (session cleared), never
    /// surfaced; the ready flag turns true in every outcome.
    ///
    /// Returns `Ok(true)` when the session came up authenticated.
    pub async fn bootstrap(&self) -> AuthResult<bool> {
        self.inner.transition(&AuthMachineInput::BootstrapStarted)?;

        let result = self.bootstrap_session().await;
        self.inner.mark_ready();
        result
    }

    async fn bootstrap_session(&self) -> AuthResult<bool> {
        let token = match self.inner.credentials.get_access_token()? {
            Some(token) => token,
            None => {
                info!("No persisted session found on startup");
                self.inner.try_transition(&AuthMachineInput::SessionMissing);
                return Ok(false);
            }
        };

        if jwt::is_expired(&token) {
            info!("Persisted session expired, refreshing before ready");
            self.inner.try_transition(&AuthMachineInput::SessionExpired);

            return match self.refresh().await {
                Ok(_) => {
                    info!("Session refreshed on startup");
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "Startup refresh failed, session cleared");
                    self.logout()?;
                    Ok(false)
                }
            };
        }

        // Token looks valid locally; confirm it server-side and pick up
        // the identity while we are at it.
        match self.inner.api.me(&token).await {
            Ok(identity) => {
                info!(user_id = %identity.id, "Persisted session validated");
                *self.inner.identity.lock().unwrap() = Some(identity);
                self.inner.try_transition(&AuthMachineInput::SessionValid);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Persisted session rejected, logging out");
                self.logout()?;
                Ok(false)
            }
        }
    }

    /// Login with an identifier/secret pair.
    ///
    /// On failure the prior session state, if any, is left untouched.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        remember: bool,
    ) -> AuthResult<Identity> {
        let replacing = self.state() == AuthState::LoggedIn;
        if !replacing {
            self.inner.transition(&AuthMachineInput::LoginAttempt)?;
        }

        match self.inner.api.login(identifier, secret, remember).await {
            Ok(pair) => {
                self.inner.install_session(&pair, remember)?;
                if !replacing {
                    self.inner.try_transition(&AuthMachineInput::LoginSuccess);
                }
                self.inner.mark_ready();
                info!(user_id = %pair.identity.id, "Login successful");
                Ok(pair.identity)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                if !replacing {
                    self.inner.try_transition(&AuthMachineInput::LoginFailed);
                }
                Err(e)
            }
        }
    }

    /// Create an account and establish a session.
    ///
    /// Same contract as [`login`](Self::login): an existing session is
    /// only replaced on success.
    pub async fn register(&self, payload: serde_json::Value) -> AuthResult<Identity> {
        let replacing = self.state() == AuthState::LoggedIn;
        if !replacing {
            self.inner.transition(&AuthMachineInput::RegisterAttempt)?;
        }

        match self.inner.api.register(payload).await {
            Ok(pair) => {
                self.inner.install_session(&pair, true)?;
                if !replacing {
                    self.inner.try_transition(&AuthMachineInput::LoginSuccess);
                }
                self.inner.mark_ready();
                info!(user_id = %pair.identity.id, "Registration successful");
                Ok(pair.identity)
            }
            Err(e) => {
                warn!(error = %e, "Registration failed");
                if !replacing {
                    self.inner.try_transition(&AuthMachineInput::LoginFailed);
                }
                Err(e)
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers are coalesced into a single exchange; all of
    /// them observe the same outcome. Fails fast without a network call
    /// when no refresh token is held. A rejected exchange clears the
    /// session.
    pub async fn refresh(&self) -> AuthResult<String> {
        let refresh_token = self
            .inner
            .refresh_token()
            .ok_or(AuthError::NoRefreshToken)?;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let inner = self.inner.clone();

        let outcome = self
            .inner
            .refresh_flight
            .run(move || SessionInner::exchange_refresh(inner, refresh_token, epoch).boxed())
            .await;

        outcome.map_err(|e| AuthError::RefreshFailed(e.to_string()))
    }

    /// Clear the session: tokens, preferences and identity.
    ///
    /// Idempotent; safe to call when already logged out.
    pub fn logout(&self) -> AuthResult<()> {
        self.inner
            .try_transition(&AuthMachineInput::LogoutRequested);

        self.inner.clear_session()?;

        self.inner.try_transition(&AuthMachineInput::LogoutComplete);
        self.inner.settle_fsm_after_clear();

        info!("Logged out");
        Ok(())
    }

    /// Whether a refresh exchange is currently pending.
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refresh_flight.in_flight()
    }
}

impl SessionInner {
    /// Apply an FSM input, erroring on an invalid transition.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
            self.notify_state_change(&new_state);
        }

        Ok(new_state)
    }

    /// Apply an FSM input, ignoring it when invalid in the current
    /// state. Used on paths that may arrive from several states.
    fn try_transition(&self, input: &AuthMachineInput) {
        let _ = self.transition(input);
    }

    /// After a clear, the FSM must read NotLoggedIn even when the clear
    /// arrived from a state with no logout edge (bootstrap rejection,
    /// logout during a pending refresh).
    fn settle_fsm_after_clear(&self) {
        let mut fsm = self.fsm.lock().unwrap();
        if AuthState::from(fsm.state()) == AuthState::NotLoggedIn {
            return;
        }
        *fsm = AuthMachine::new();
        drop(fsm);
        self.notify_state_change(&AuthState::NotLoggedIn);
    }

    fn notify_state_change(&self, state: &AuthState) {
        let cb = self.state_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            let user_id = self.identity.lock().unwrap().as_ref().map(|i| i.id.clone());
            callback(crate::AuthStateChangedPayload {
                state: state.clone(),
                user_id,
            });
        }
    }

    fn mark_ready(&self) {
        let _ = self.ready_tx.send(true);
    }

    /// The refresh token, wherever the session keeps it.
    fn refresh_token(&self) -> Option<String> {
        if let Some(token) = self.volatile_refresh_token.lock().unwrap().clone() {
            return Some(token);
        }
        self.credentials.get_refresh_token().ok().flatten()
    }

    /// Store a fresh token pair and identity, starting a new epoch.
    fn install_session(&self, pair: &TokenPair, remember: bool) -> AuthResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.remembered.store(remember, Ordering::SeqCst);
        self.apply_token_pair(pair, remember)
    }

    /// Write a token pair without starting a new epoch (refresh path).
    fn apply_token_pair(&self, pair: &TokenPair, remember: bool) -> AuthResult<()> {
        self.credentials.set_access_token(&pair.access_token)?;

        if let Some(refresh_token) = &pair.refresh_token {
            if remember {
                self.credentials.set_refresh_token(refresh_token)?;
                *self.volatile_refresh_token.lock().unwrap() = None;
            } else {
                let _ = self.credentials.delete_refresh_token();
                *self.volatile_refresh_token.lock().unwrap() = Some(refresh_token.clone());
            }
        }

        *self.identity.lock().unwrap() = Some(pair.identity.clone());
        Ok(())
    }

    /// Destroy all session state and start a new epoch.
    fn clear_session(&self) -> AuthResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.credentials.clear_session()?;
        *self.identity.lock().unwrap() = None;
        *self.volatile_refresh_token.lock().unwrap() = None;
        Ok(())
    }

    /// The single refresh exchange every concurrent caller joins.
    async fn exchange_refresh(
        inner: Arc<SessionInner>,
        refresh_token: String,
        epoch: u64,
    ) -> RefreshOutcome {
        inner.try_transition(&AuthMachineInput::TokenExpired);
        debug!("Exchanging refresh token");

        match inner.api.refresh(&refresh_token).await {
            Ok(pair) => {
                if inner.epoch.load(Ordering::SeqCst) != epoch {
                    warn!("Session replaced during refresh, discarding result");
                    inner.try_transition(&AuthMachineInput::RefreshFailed);
                    return Err(Arc::new(AuthError::RefreshFailed(
                        "Session was cleared during refresh".to_string(),
                    )));
                }

                let remember = inner.remembered.load(Ordering::SeqCst);
                if let Err(e) = inner.apply_token_pair(&pair, remember) {
                    return Err(Arc::new(e));
                }

                inner.try_transition(&AuthMachineInput::RefreshSuccess);
                info!(user_id = %pair.identity.id, "Token refreshed");
                Ok(pair.access_token)
            }
            Err(e) => {
                // A failed refresh is terminal for the session, but only
                // for the session it was started under.
                if inner.epoch.load(Ordering::SeqCst) == epoch {
                    warn!(error = %e, "Refresh failed, clearing session");
                    if let Err(clear_err) = inner.clear_session() {
                        warn!(error = %clear_err, "Failed to clear session after refresh failure");
                    }
                    inner.try_transition(&AuthMachineInput::RefreshFailed);
                    inner.settle_fsm_after_clear();
                }
                Err(Arc::new(e))
            }
        }
    }
}
