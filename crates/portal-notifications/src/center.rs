//! Notification reconciliation.

use crate::{AlertSink, Notification, NotificationApi, NotifyResult, PushEvent};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Callback invoked with the unread count after every change.
pub type BadgeCallback = Box<dyn Fn(u64) + Send + Sync>;

#[derive(Default, Clone)]
struct NotifState {
    /// Newest-first by arrival. Late events are appended at the front
    /// like any other arrival, never reinserted by timestamp.
    entries: Vec<Notification>,
    /// May exceed `entries` — the local list holds only what has been
    /// fetched or pushed, the counter tracks the authoritative set.
    unread_count: u64,
}

/// Merges pushed notification events and REST baselines into one
/// consistent local set.
///
/// The unread counter is only ever written here; push handlers and UI
/// actions both funnel through this type.
pub struct NotificationCenter {
    api: Arc<dyn NotificationApi>,
    alerts: Arc<dyn AlertSink>,
    state: Mutex<NotifState>,
    badge_callback: Mutex<Option<BadgeCallback>>,
}

impl NotificationCenter {
    pub fn new(api: Arc<dyn NotificationApi>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            api,
            alerts,
            state: Mutex::new(NotifState::default()),
            badge_callback: Mutex::new(None),
        }
    }

    /// Set a callback to be invoked with every unread-count change.
    pub fn set_badge_callback(&self, callback: BadgeCallback) {
        let mut cb = self.badge_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Fetch the authoritative unread count.
    ///
    /// Runs before push subscription so the badge has a correct
    /// baseline even when the channel connects late or events were
    /// missed while offline.
    pub async fn bootstrap(&self) -> NotifyResult<u64> {
        let count = self.api.unread_count().await?;
        {
            let mut state = self.state.lock().unwrap();
            state.unread_count = count;
        }
        info!(unread_count = count, "Notification baseline loaded");
        self.fire_badge();
        Ok(count)
    }

    /// Current unread count.
    pub fn unread_count(&self) -> u64 {
        self.state.lock().unwrap().unread_count
    }

    /// Snapshot of the local notification list, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Apply one pushed event, in delivery order.
    pub fn apply_event(&self, event: PushEvent) {
        let alert = {
            let mut state = self.state.lock().unwrap();
            match event {
                PushEvent::New(notification) => {
                    // Reconnect redelivery must not double-count.
                    if state.entries.iter().any(|n| n.id == notification.id) {
                        debug!(id = notification.id, "Duplicate notification dropped");
                        None
                    } else {
                        if !notification.is_read {
                            state.unread_count += 1;
                        }
                        state.entries.insert(0, notification.clone());
                        Some(notification)
                    }
                }
                PushEvent::Read { id } => {
                    if let Some(entry) = state.entries.iter_mut().find(|n| n.id == id) {
                        if !entry.is_read {
                            entry.is_read = true;
                            state.unread_count = state.unread_count.saturating_sub(1);
                        }
                    }
                    None
                }
                PushEvent::Deleted { id } => {
                    if let Some(pos) = state.entries.iter().position(|n| n.id == id) {
                        let removed = state.entries.remove(pos);
                        if !removed.is_read {
                            state.unread_count = state.unread_count.saturating_sub(1);
                        }
                    }
                    None
                }
                PushEvent::UnreadCount { count } => {
                    // Authoritative resync; always wins over whatever we
                    // derived locally.
                    state.unread_count = count;
                    None
                }
            }
        };

        if let Some(notification) = alert {
            self.alerts.notify(&notification);
        }
        self.fire_badge();
    }

    /// Mark notifications read: optimistic local flip, REST call, exact
    /// rollback when the call fails.
    pub async fn mark_as_read(&self, ids: &[i64]) -> NotifyResult<()> {
        let prior = self.mutate(|state| {
            for entry in state.entries.iter_mut().filter(|n| ids.contains(&n.id)) {
                if !entry.is_read {
                    entry.is_read = true;
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
            }
        });

        if let Err(e) = self.api.mark_read(ids).await {
            warn!(error = %e, "mark_read failed, rolling back");
            self.restore(prior);
            return Err(e);
        }
        Ok(())
    }

    /// Mark everything read.
    pub async fn mark_all_as_read(&self) -> NotifyResult<()> {
        let prior = self.mutate(|state| {
            for entry in state.entries.iter_mut() {
                entry.is_read = true;
            }
            state.unread_count = 0;
        });

        if let Err(e) = self.api.mark_all_read().await {
            warn!(error = %e, "mark_all_read failed, rolling back");
            self.restore(prior);
            return Err(e);
        }
        Ok(())
    }

    /// Delete notifications.
    pub async fn delete(&self, ids: &[i64]) -> NotifyResult<()> {
        let prior = self.mutate(|state| {
            let mut kept = Vec::with_capacity(state.entries.len());
            for entry in state.entries.drain(..) {
                if ids.contains(&entry.id) {
                    if !entry.is_read {
                        state.unread_count = state.unread_count.saturating_sub(1);
                    }
                } else {
                    kept.push(entry);
                }
            }
            state.entries = kept;
        });

        if let Err(e) = self.api.delete(ids).await {
            warn!(error = %e, "delete failed, rolling back");
            self.restore(prior);
            return Err(e);
        }
        Ok(())
    }

    /// Apply an optimistic mutation and return the prior state for a
    /// possible rollback.
    fn mutate<F: FnOnce(&mut NotifState)>(&self, f: F) -> NotifState {
        let prior = {
            let mut state = self.state.lock().unwrap();
            let prior = state.clone();
            f(&mut state);
            prior
        };
        self.fire_badge();
        prior
    }

    /// Restore a prior state wholesale; no client/server divergence may
    /// outlive a failed call.
    fn restore(&self, prior: NotifState) {
        {
            let mut state = self.state.lock().unwrap();
            *state = prior;
        }
        self.fire_badge();
    }

    fn fire_badge(&self) {
        let count = self.unread_count();
        let cb = self.badge_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            callback(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NotificationKind, NotifyError};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockNotificationApi {
        unread: u64,
        fail: AtomicBool,
        mark_read_calls: AtomicUsize,
    }

    impl MockNotificationApi {
        fn new(unread: u64) -> Arc<Self> {
            Arc::new(Self {
                unread,
                fail: AtomicBool::new(false),
                mark_read_calls: AtomicUsize::new(0),
            })
        }

        fn check(&self) -> NotifyResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(NotifyError::Api(portal_api::ApiError::Server {
                    status: 500,
                    body: "boom".to_string(),
                }))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NotificationApi for MockNotificationApi {
        async fn unread_count(&self) -> NotifyResult<u64> {
            self.check()?;
            Ok(self.unread)
        }
        async fn mark_read(&self, _: &[i64]) -> NotifyResult<()> {
            self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
            self.check()
        }
        async fn mark_all_read(&self) -> NotifyResult<()> {
            self.check()
        }
        async fn delete(&self, _: &[i64]) -> NotifyResult<()> {
            self.check()
        }
    }

    struct RecordingAlertSink {
        fired: Mutex<Vec<i64>>,
    }

    impl AlertSink for RecordingAlertSink {
        fn notify(&self, notification: &Notification) {
            self.fired.lock().unwrap().push(notification.id);
        }
    }

    fn notification(id: i64, is_read: bool) -> Notification {
        Notification {
            id,
            title: format!("Notification {}", id),
            message: "Something happened".to_string(),
            kind: NotificationKind::Info,
            is_read,
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap()
                + ChronoDuration::seconds(id),
            action_link: None,
        }
    }

    fn center_with(api: Arc<MockNotificationApi>) -> (NotificationCenter, Arc<RecordingAlertSink>) {
        let alerts = Arc::new(RecordingAlertSink {
            fired: Mutex::new(Vec::new()),
        });
        (NotificationCenter::new(api, alerts.clone()), alerts)
    }

    #[tokio::test]
    async fn test_bootstrap_sets_baseline() {
        let (center, _) = center_with(MockNotificationApi::new(6));
        assert_eq!(center.bootstrap().await.unwrap(), 6);
        assert_eq!(center.unread_count(), 6);
    }

    #[test]
    fn test_new_notification_inserts_and_counts() {
        let (center, alerts) = center_with(MockNotificationApi::new(0));

        center.apply_event(PushEvent::New(notification(1, false)));

        assert_eq!(center.notifications().len(), 1);
        assert_eq!(center.unread_count(), 1);
        assert_eq!(*alerts.fired.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_duplicate_push_is_deduplicated() {
        let (center, alerts) = center_with(MockNotificationApi::new(0));

        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(1, false)));

        // One entry, one increment, one alert.
        assert_eq!(center.notifications().len(), 1);
        assert_eq!(center.unread_count(), 1);
        assert_eq!(alerts.fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_already_read_push_does_not_count() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        center.apply_event(PushEvent::New(notification(1, true)));
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn test_arrival_order_is_newest_first_not_created_at() {
        let (center, _) = center_with(MockNotificationApi::new(0));

        // id 5 was created later than id 3, but id 3 arrives second:
        // arrival order wins, no timestamp reordering.
        center.apply_event(PushEvent::New(notification(5, false)));
        center.apply_event(PushEvent::New(notification(3, false)));

        let ids: Vec<i64> = center.notifications().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn test_read_event_decrements_once() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        center.apply_event(PushEvent::New(notification(1, false)));

        center.apply_event(PushEvent::Read { id: 1 });
        center.apply_event(PushEvent::Read { id: 1 });
        center.apply_event(PushEvent::Read { id: 1 });

        // Replays of the same read never drive the counter below 0.
        assert_eq!(center.unread_count(), 0);
        assert!(center.notifications()[0].is_read);
    }

    #[test]
    fn test_delete_event_floors_at_zero() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        center.apply_event(PushEvent::New(notification(1, false)));

        center.apply_event(PushEvent::Deleted { id: 1 });
        center.apply_event(PushEvent::Deleted { id: 1 });
        center.apply_event(PushEvent::Read { id: 1 });

        assert_eq!(center.unread_count(), 0);
        assert!(center.notifications().is_empty());
    }

    #[test]
    fn test_deleting_read_entry_keeps_counter() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, true)));

        center.apply_event(PushEvent::Deleted { id: 2 });

        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_unread_count_event_overwrites() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, false)));
        assert_eq!(center.unread_count(), 2);

        // Authoritative resync after a reconnect always wins.
        center.apply_event(PushEvent::UnreadCount { count: 40 });
        assert_eq!(center.unread_count(), 40);
    }

    #[tokio::test]
    async fn test_mark_as_read_optimistic_success() {
        let api = MockNotificationApi::new(0);
        let (center, _) = center_with(api.clone());
        center.apply_event(PushEvent::New(notification(5, false)));

        center.mark_as_read(&[5]).await.unwrap();

        assert!(center.notifications()[0].is_read);
        assert_eq!(center.unread_count(), 0);
        assert_eq!(api.mark_read_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_as_read_rolls_back_on_failure() {
        let api = MockNotificationApi::new(0);
        let (center, _) = center_with(api.clone());
        center.apply_event(PushEvent::New(notification(5, false)));
        assert_eq!(center.unread_count(), 1);

        api.fail.store(true, Ordering::SeqCst);
        let err = center.mark_as_read(&[5]).await.unwrap_err();
        assert!(matches!(err, NotifyError::Api(_)));

        // Exact prior state restored: entry unread, counter back up.
        assert!(!center.notifications()[0].is_read);
        assert_eq!(center.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_as_read_rolls_back_on_failure() {
        let api = MockNotificationApi::new(0);
        let (center, _) = center_with(api.clone());
        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, false)));

        api.fail.store(true, Ordering::SeqCst);
        assert!(center.mark_all_as_read().await.is_err());

        assert_eq!(center.unread_count(), 2);
        assert!(center.notifications().iter().all(|n| !n.is_read));
    }

    #[tokio::test]
    async fn test_delete_rolls_back_on_failure() {
        let api = MockNotificationApi::new(0);
        let (center, _) = center_with(api.clone());
        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, true)));

        api.fail.store(true, Ordering::SeqCst);
        assert!(center.delete(&[1, 2]).await.is_err());

        assert_eq!(center.notifications().len(), 2);
        assert_eq!(center.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_success_adjusts_counter_for_unread_only() {
        let api = MockNotificationApi::new(0);
        let (center, _) = center_with(api.clone());
        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, true)));

        center.delete(&[1, 2]).await.unwrap();

        assert!(center.notifications().is_empty());
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn test_badge_callback_tracks_counter() {
        let (center, _) = center_with(MockNotificationApi::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        center.set_badge_callback(Box::new(move |count| {
            seen_clone.lock().unwrap().push(count);
        }));

        center.apply_event(PushEvent::New(notification(1, false)));
        center.apply_event(PushEvent::New(notification(2, false)));
        center.apply_event(PushEvent::Read { id: 1 });

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }
}
