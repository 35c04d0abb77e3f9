//! Typed event bus with removable subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Event kinds handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewNotification,
    NotificationRead,
    NotificationDeleted,
    UnreadCount,
    Message,
    Connected,
    Disconnected,
}

/// A decoded server-pushed event.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    NewNotification(serde_json::Value),
    NotificationRead { id: i64 },
    NotificationDeleted { id: i64 },
    UnreadCount { count: u64 },
    /// Room/chat traffic and any event the client has no schema for.
    Message {
        name: String,
        room: Option<String>,
        payload: serde_json::Value,
    },
    Connected,
    Disconnected { reason: Option<String> },
}

impl ServerEvent {
    /// The subscription kind this event dispatches to.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewNotification(_) => EventKind::NewNotification,
            ServerEvent::NotificationRead { .. } => EventKind::NotificationRead,
            ServerEvent::NotificationDeleted { .. } => EventKind::NotificationDeleted,
            ServerEvent::UnreadCount { .. } => EventKind::UnreadCount,
            ServerEvent::Message { .. } => EventKind::Message,
            ServerEvent::Connected => EventKind::Connected,
            ServerEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }

    /// Decode a wire event frame into a typed event.
    ///
    /// Returns `None` for known events with malformed payloads; unknown
    /// event names are passed through as [`ServerEvent::Message`].
    pub fn from_wire(
        name: &str,
        room: Option<String>,
        payload: Option<serde_json::Value>,
    ) -> Option<ServerEvent> {
        let payload = payload.unwrap_or(serde_json::Value::Null);
        match name {
            "new_notification" => Some(ServerEvent::NewNotification(payload)),
            "notification_read" => {
                let id = payload.get("id")?.as_i64()?;
                Some(ServerEvent::NotificationRead { id })
            }
            "notification_deleted" => {
                let id = payload.get("id")?.as_i64()?;
                Some(ServerEvent::NotificationDeleted { id })
            }
            "unread_count" => {
                let count = payload.get("unreadCount")?.as_u64()?;
                Some(ServerEvent::UnreadCount { count })
            }
            other => Some(ServerEvent::Message {
                name: other.to_string(),
                room,
                payload,
            }),
        }
    }
}

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

/// Event bus dispatching typed events to registered handlers.
///
/// Cheap to clone; all clones share one handler registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event kind. Multiple handlers per kind
    /// are allowed; each receives every matching event until its
    /// subscription is dropped via [`Subscription::unsubscribe`].
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Dispatch an event to every handler registered for its kind.
    pub fn publish(&self, event: &ServerEvent) {
        // Snapshot outside the lock so a handler can subscribe or
        // unsubscribe without deadlocking.
        let snapshot: Vec<Handler> = {
            let handlers = self.inner.handlers.lock().unwrap();
            handlers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of live handlers for a kind.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.inner.handlers.lock().unwrap();
        handlers.get(&kind).map(|list| list.len()).unwrap_or(0)
    }
}

/// Handle for a registered handler.
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut handlers = bus.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(&self.kind) {
            let before = list.len();
            list.retain(|(id, _)| *id != self.id);
            if list.len() != before {
                debug!(kind = ?self.kind, "Handler unsubscribed");
            }
        }
    }
}
