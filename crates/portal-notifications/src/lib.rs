//! Notification state synchronization.
//!
//! Merges server-pushed notification events with REST-fetched baselines
//! into a single deduplicated local set, keeps the unread counter
//! consistent through both paths, and rolls back optimistic mutations
//! whose REST call failed.

mod alert;
mod api;
mod center;
mod error;
mod model;

pub use alert::{AlertSink, LogAlertSink};
pub use api::{NotificationApi, RestNotificationApi};
pub use center::{BadgeCallback, NotificationCenter};
pub use error::{NotifyError, NotifyResult};
pub use model::{Notification, NotificationKind, PushEvent};
