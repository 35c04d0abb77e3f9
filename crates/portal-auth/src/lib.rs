//! Session and token lifecycle for the portal client.
//!
//! This crate provides:
//! - The session manager (login, register, logout, refresh, bootstrap)
//! - Explicit FSM-based auth state tracking
//! - Single-flight coalescing for token refresh
//! - Unverified JWT expiry decoding
//! - The REST auth API client

mod api;
mod error;
mod fsm;
mod jwt;
mod session;
mod single_flight;

pub use api::{AuthApi, Identity, RestAuthApi, TokenPair};
pub use error::{AuthError, AuthResult};
pub use fsm::portal_auth_machine;
pub use fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateCallback,
    AuthStateChangedPayload,
};
pub use jwt::{decode_expiry, is_expired};
pub use session::{SessionManager, SessionSnapshot};
pub use single_flight::SingleFlight;
