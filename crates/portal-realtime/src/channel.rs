//! WebSocket channel manager.

use crate::{ChannelError, ChannelResult, EventBus, EventKind, ServerEvent, Subscription};
use crate::{WireMessage, WireMessageType};
use futures_util::{SinkExt, StreamExt};
use portal_auth::SessionManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Channel server URL (e.g. wss://api.portal.app/ws).
    pub url: String,
    /// Heartbeat interval while connected.
    pub heartbeat_interval: Duration,
    /// Base reconnect delay.
    pub reconnect_base_delay: Duration,
    /// Maximum reconnect delay.
    pub reconnect_max_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.portal.app/ws".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

impl ChannelConfig {
    /// Delay before reconnect attempt `attempt` (1-indexed), doubling
    /// up to the configured maximum. Reconnects are attempted
    /// indefinitely; only `close()` stops them.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Cap the exponent; the max delay dominates well before it.
        let exp = attempt.saturating_sub(1).min(6);
        let delay = self.reconnect_base_delay.saturating_mul(2u32.pow(exp));
        delay.min(self.reconnect_max_delay)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    /// Terminal; reached only through an explicit `close()`.
    Closed,
}

/// Callback invoked with the server's ack payload.
pub type AckCallback = Box<dyn FnOnce(serde_json::Value) + Send + 'static>;

/// How a connection run ended.
enum ConnectionOutcome {
    /// Unplanned: dial failure, handshake rejection or dropped stream.
    Failed,
    /// `close()` was requested; no reconnect may follow.
    Closed,
}

enum FrameOutcome {
    Continue,
    AuthRejected,
}

struct ChannelInner {
    config: ChannelConfig,
    session: SessionManager,
    client_id: String,
    state: RwLock<ChannelState>,
    bus: EventBus,
    sender: Mutex<Option<mpsc::Sender<Message>>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    reconnect_attempts: Mutex<u32>,
    pending_acks: Mutex<HashMap<u64, AckCallback>>,
    next_ack_id: AtomicU64,
    supervisor_running: AtomicBool,
}

/// WebSocket channel manager with automatic reconnection.
///
/// One live connection per authenticated session. The handshake token
/// is read from the session manager at every attempt, never cached, so
/// a reconnect after a refresh carries the fresh credential.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ChannelInner>,
}

impl ChannelManager {
    /// Create a new channel manager.
    pub fn new(config: ChannelConfig, session: SessionManager) -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ChannelInner {
                config,
                session,
                client_id: uuid::Uuid::new_v4().to_string(),
                state: RwLock::new(ChannelState::Disconnected),
                bus: EventBus::new(),
                sender: Mutex::new(None),
                closed_tx,
                closed_rx,
                reconnect_attempts: Mutex::new(0),
                pending_acks: Mutex::new(HashMap::new()),
                next_ack_id: AtomicU64::new(1),
                supervisor_running: AtomicBool::new(false),
            }),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults(session: SessionManager) -> Self {
        Self::new(ChannelConfig::default(), session)
    }

    /// Get the current connection state.
    pub fn state(&self) -> ChannelState {
        *self.inner.state.read().unwrap()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Register a handler for an event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    /// Open the channel.
    ///
    /// No-op while already connecting/connected, and after `close()`.
    /// Returns as soon as the connection task is running; subscribe to
    /// [`EventKind::Connected`] to learn when the handshake completes.
    pub async fn connect(&self) {
        {
            let mut state = self.inner.state.write().unwrap();
            match *state {
                ChannelState::Connecting
                | ChannelState::Authenticating
                | ChannelState::Connected => {
                    debug!("Already connecting or connected");
                    return;
                }
                ChannelState::Closed => {
                    warn!("Channel is closed, ignoring connect");
                    return;
                }
                ChannelState::Disconnected => {
                    *state = ChannelState::Connecting;
                }
            }
        }

        // A supervisor may still be alive waiting out a reconnect delay.
        if self.inner.supervisor_running.swap(true, Ordering::SeqCst) {
            debug!("Connection supervisor already running");
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            ChannelInner::supervise(inner).await;
        });
    }

    /// Emit an event. No-op with a warning when not connected; nothing
    /// is queued — callers own idempotent retries if delivery matters.
    pub async fn emit(&self, event: &str, payload: serde_json::Value) {
        if !self.is_connected() {
            warn!(event = %event, "Channel not connected, dropping emit");
            return;
        }
        self.inner
            .send_frame(WireMessage::event(event, payload, None))
            .await;
    }

    /// Emit an event and invoke `ack` with the server's ack payload.
    ///
    /// Same no-op policy as [`emit`](Self::emit) when not connected:
    /// the callback is dropped, never deferred.
    pub async fn emit_with_ack(&self, event: &str, payload: serde_json::Value, ack: AckCallback) {
        if !self.is_connected() {
            warn!(event = %event, "Channel not connected, dropping emit");
            return;
        }
        let ack_id = self.inner.next_ack_id.fetch_add(1, Ordering::Relaxed);
        self.inner.pending_acks.lock().unwrap().insert(ack_id, ack);
        self.inner
            .send_frame(WireMessage::event(event, payload, Some(ack_id)))
            .await;
    }

    /// Join a room.
    pub async fn join_room(&self, room: &str) -> ChannelResult<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.inner
            .send_frame_strict(WireMessage::join_room(room))
            .await
    }

    /// Leave a room.
    pub async fn leave_room(&self, room: &str) -> ChannelResult<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.inner
            .send_frame_strict(WireMessage::leave_room(room))
            .await
    }

    /// Send a message to a room.
    pub async fn send_message(&self, room: &str, payload: serde_json::Value) -> ChannelResult<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.inner
            .send_frame_strict(WireMessage::send_message(room, payload))
            .await
    }

    /// Close the channel for good.
    ///
    /// Terminal and idempotent. Cancels any pending reconnect timer: a
    /// close racing a scheduled reconnect always wins.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.write().unwrap();
            if *state == ChannelState::Closed {
                debug!("Channel already closed");
                return;
            }
            *state = ChannelState::Closed;
        }

        let _ = self.inner.closed_tx.send(true);
        *self.inner.sender.lock().unwrap() = None;
        self.inner.drop_pending_acks();
        info!("Channel closed");
    }
}

impl ChannelInner {
    /// Mutate the state unless the channel has been closed.
    /// Returns false when the closed state won.
    fn set_state_if_open(&self, new_state: ChannelState) -> bool {
        let mut state = self.state.write().unwrap();
        if *state == ChannelState::Closed {
            return false;
        }
        *state = new_state;
        true
    }

    fn drop_pending_acks(&self) {
        let dropped = {
            let mut acks = self.pending_acks.lock().unwrap();
            std::mem::take(&mut *acks)
        };
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Dropping pending acks");
        }
    }

    async fn send_frame(&self, msg: WireMessage) {
        if let Err(e) = self.send_frame_strict(msg).await {
            warn!(error = %e, "Channel send failed");
        }
    }

    async fn send_frame_strict(&self, msg: WireMessage) -> ChannelResult<()> {
        let json = msg.to_json()?;
        let sender = self.sender.lock().unwrap().clone();
        let sender = sender.ok_or(ChannelError::NotConnected)?;
        sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    /// Connection supervisor: run connections back to back with backoff
    /// in between, until `close()`.
    async fn supervise(inner: Arc<ChannelInner>) {
        let mut closed_rx = inner.closed_rx.clone();

        loop {
            if *closed_rx.borrow() {
                break;
            }

            if let ConnectionOutcome::Closed = Self::run_connection(&inner).await {
                break;
            }

            let attempt = {
                let mut attempts = inner.reconnect_attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            let delay = inner.config.delay_for_attempt(attempt);
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling channel reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = closed_rx.changed() => {}
            }
            if *closed_rx.borrow() {
                debug!("Close requested during reconnect delay");
                break;
            }
        }

        inner.supervisor_running.store(false, Ordering::SeqCst);
    }

    /// Run one connection until it ends.
    async fn run_connection(inner: &Arc<ChannelInner>) -> ConnectionOutcome {
        if !inner.set_state_if_open(ChannelState::Connecting) {
            return ConnectionOutcome::Closed;
        }

        // The token is read from the session at every attempt so a
        // reconnect never reuses a credential the session has replaced.
        let Some(token) = inner.session.current_access_token() else {
            warn!("No valid access token for channel handshake");
            inner.set_state_if_open(ChannelState::Disconnected);
            return ConnectionOutcome::Failed;
        };

        info!(url = %inner.config.url, "Connecting to channel");
        let (ws_stream, _) = match connect_async(inner.config.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "Channel dial failed");
                inner.set_state_if_open(ChannelState::Disconnected);
                return ConnectionOutcome::Failed;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        if !inner.set_state_if_open(ChannelState::Authenticating) {
            return ConnectionOutcome::Closed;
        }

        let auth_frame = match WireMessage::auth(&token, &inner.client_id).to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode handshake");
                inner.set_state_if_open(ChannelState::Disconnected);
                return ConnectionOutcome::Failed;
            }
        };
        if let Err(e) = write.send(Message::Text(auth_frame.into())).await {
            warn!(error = %e, "Failed to send handshake");
            inner.set_state_if_open(ChannelState::Disconnected);
            return ConnectionOutcome::Failed;
        }
        debug!("Sent auth handshake");

        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(100);
        *inner.sender.lock().unwrap() = Some(msg_tx.clone());

        // Writer task
        let sender_handle = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Heartbeat task
        let heartbeat_sender = msg_tx.clone();
        let heartbeat_interval = inner.config.heartbeat_interval;
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = interval(heartbeat_interval);
            loop {
                interval.tick().await;
                if let Ok(json) = WireMessage::heartbeat().to_json() {
                    if heartbeat_sender
                        .send(Message::Text(json.into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        });

        // Read loop; a close request interrupts it immediately.
        let mut closed_rx = inner.closed_rx.clone();
        let outcome = loop {
            tokio::select! {
                _ = closed_rx.changed() => {
                    if *closed_rx.borrow() {
                        break ConnectionOutcome::Closed;
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => match WireMessage::from_json(&text) {
                            Ok(msg) => {
                                if let FrameOutcome::AuthRejected = inner.handle_frame(msg) {
                                    break ConnectionOutcome::Failed;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to parse channel frame");
                            }
                        },
                        Some(Ok(Message::Close(_))) => {
                            info!("Channel closed by server");
                            break ConnectionOutcome::Failed;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = msg_tx.send(Message::Pong(data)).await;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Channel stream error");
                            break ConnectionOutcome::Failed;
                        }
                        None => break ConnectionOutcome::Failed,
                    }
                }
            }
        };

        // Cleanup
        heartbeat_handle.abort();
        sender_handle.abort();
        *inner.sender.lock().unwrap() = None;
        inner.drop_pending_acks();

        if !matches!(outcome, ConnectionOutcome::Closed) {
            inner.set_state_if_open(ChannelState::Disconnected);
            inner.bus.publish(&ServerEvent::Disconnected { reason: None });
        }
        outcome
    }

    /// Handle one inbound frame.
    fn handle_frame(&self, msg: WireMessage) -> FrameOutcome {
        match msg.msg_type {
            WireMessageType::AuthResult => {
                if msg.success == Some(true) {
                    self.set_state_if_open(ChannelState::Connected);
                    *self.reconnect_attempts.lock().unwrap() = 0;
                    info!("Channel authenticated");
                    self.bus.publish(&ServerEvent::Connected);
                } else {
                    let error = msg.error.unwrap_or_else(|| "Unknown error".to_string());
                    warn!(error = %error, "Channel handshake rejected");
                    return FrameOutcome::AuthRejected;
                }
            }
            WireMessageType::Event => {
                if let Some(name) = msg.event.as_deref() {
                    match ServerEvent::from_wire(name, msg.room, msg.payload) {
                        Some(event) => {
                            debug!(event = %name, "Channel event");
                            self.bus.publish(&event);
                        }
                        None => {
                            warn!(event = %name, "Dropping malformed event payload");
                        }
                    }
                }
            }
            WireMessageType::Ack => {
                if let Some(ack_id) = msg.ack_id {
                    let callback = self.pending_acks.lock().unwrap().remove(&ack_id);
                    match callback {
                        Some(callback) => {
                            callback(msg.payload.unwrap_or(serde_json::Value::Null));
                        }
                        None => debug!(ack_id, "Ack for unknown or settled emit"),
                    }
                }
            }
            WireMessageType::SendMessage => {
                // Room traffic relayed by the server.
                self.bus.publish(&ServerEvent::Message {
                    name: "send_message".to_string(),
                    room: msg.room,
                    payload: msg.payload.unwrap_or(serde_json::Value::Null),
                });
            }
            WireMessageType::Error => {
                let error = msg.error.unwrap_or_else(|| "Unknown error".to_string());
                warn!(error = %error, "Channel error frame");
            }
            other => {
                debug!(msg_type = ?other, "Ignoring frame");
            }
        }
        FrameOutcome::Continue
    }
}
