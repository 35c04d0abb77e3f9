//! User-facing alert seam.

use crate::Notification;

/// Where freshly-pushed notifications get surfaced to the user (toast,
/// platform notification). The UI layer implements this; the core only
/// decides *when* to fire it.
pub trait AlertSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Default sink that only logs.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, notification: &Notification) {
        tracing::info!(
            id = notification.id,
            kind = ?notification.kind,
            title = %notification.title,
            "Notification received"
        );
    }
}
