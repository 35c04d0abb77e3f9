//! Authentication state machine using rust-fsm.
//!
//! An explicit finite state machine for the session lifecycle, instead
//! of deriving state from storage checks.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │   NotLoggedIn   │ (initial)
//! └────────┬────────┘
//!          │ LoginAttempt / RegisterAttempt / BootstrapStarted
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ LoggingIn /     │     │  Bootstrapping  │
//! │ Registering     │     └────────┬────────┘
//! └────────┬────────┘              │ SessionValid ──────────► LoggedIn
//!          │                       │ SessionMissing ────────► NotLoggedIn
//!          │ LoginSuccess          │ SessionExpired ────────► Refreshing
//!          ▼                       ▼
//! ┌─────────────────┐      TokenExpired      ┌─────────────────┐
//! │    LoggedIn     │ ─────────────────────► │   Refreshing    │
//! └────────┬────────┘                        └────────┬────────┘
//!          │ LogoutRequested                          │ RefreshSuccess => LoggedIn
//!          ▼                                          │ RefreshFailed  => NotLoggedIn
//! ┌─────────────────┐                                 ▼
//! │   LoggingOut    │ ── LogoutComplete ──► NotLoggedIn
//! └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub portal_auth_machine(NotLoggedIn)

    NotLoggedIn => {
        BootstrapStarted => Bootstrapping,
        LoginAttempt => LoggingIn,
        RegisterAttempt => Registering
    },
    Bootstrapping => {
        // Persisted token present and unexpired, identity fetched
        SessionValid => LoggedIn,
        // Nothing persisted
        SessionMissing => NotLoggedIn,
        // Persisted token expired locally, refresh before ready
        SessionExpired => Refreshing,
        // Identity fetch rejected the token
        BootstrapFailed => NotLoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    Registering => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    LoggedIn => {
        TokenExpired => Refreshing,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        RefreshSuccess => LoggedIn,
        RefreshFailed => NotLoggedIn
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

// Re-export the generated types with clearer names
pub use portal_auth_machine::Input as AuthMachineInput;
pub use portal_auth_machine::State as AuthMachineState;
pub use portal_auth_machine::StateMachine as AuthMachine;

/// User-friendly authentication state for external consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Not logged in.
    NotLoggedIn,
    /// Validating a persisted session on startup.
    Bootstrapping,
    /// Currently logging in.
    LoggingIn,
    /// Currently creating an account.
    Registering,
    /// Logged in with a valid session.
    LoggedIn,
    /// Exchanging the refresh token for a new access token.
    Refreshing,
    /// Currently logging out.
    LoggingOut,
}

impl AuthState {
    /// Returns true if the user has a valid session (LoggedIn only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::Bootstrapping
                | AuthState::LoggingIn
                | AuthState::Registering
                | AuthState::Refreshing
                | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::Bootstrapping => AuthState::Bootstrapping,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::Registering => AuthState::Registering,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    /// User ID if logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;
