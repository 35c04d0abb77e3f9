//! Notification data model.

use chrono::{DateTime, Utc};
use portal_realtime::ServerEvent;
use serde::{Deserialize, Serialize};

/// Severity/kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A notification as held in the local set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned unique id
    pub id: i64,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_link: Option<String>,
}

/// A notification event received over the channel.
#[derive(Debug, Clone)]
pub enum PushEvent {
    New(Notification),
    Read { id: i64 },
    Deleted { id: i64 },
    /// Authoritative counter resync; always wins over derived counts.
    UnreadCount { count: u64 },
}

impl PushEvent {
    /// Decode a channel event into a push event.
    ///
    /// Non-notification traffic maps to `None`; a `new_notification`
    /// with an undecodable payload is an error so redelivery bugs
    /// surface instead of silently dropping entries.
    pub fn from_server_event(event: &ServerEvent) -> Result<Option<PushEvent>, crate::NotifyError> {
        match event {
            ServerEvent::NewNotification(payload) => {
                let notification: Notification = serde_json::from_value(payload.clone())
                    .map_err(|e| crate::NotifyError::Payload(e.to_string()))?;
                Ok(Some(PushEvent::New(notification)))
            }
            ServerEvent::NotificationRead { id } => Ok(Some(PushEvent::Read { id: *id })),
            ServerEvent::NotificationDeleted { id } => Ok(Some(PushEvent::Deleted { id: *id })),
            ServerEvent::UnreadCount { count } => Ok(Some(PushEvent::UnreadCount { count: *count })),
            _ => Ok(None),
        }
    }
}
