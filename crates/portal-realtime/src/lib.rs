//! Realtime channel for server-pushed events.
//!
//! This crate provides:
//! - The wire protocol frames for the bidirectional channel
//! - A typed event bus with removable handler subscriptions
//! - The channel manager: authenticated handshake, heartbeats, and
//!   reconnection with backoff that an explicit `close()` always wins

mod bus;
mod channel;
mod error;
mod messages;

pub use bus::{EventBus, EventKind, ServerEvent, Subscription};
pub use channel::{AckCallback, ChannelConfig, ChannelManager, ChannelState};
pub use error::{ChannelError, ChannelResult};
pub use messages::{WireMessage, WireMessageType};
