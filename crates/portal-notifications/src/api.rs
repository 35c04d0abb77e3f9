//! Notification REST endpoints.

use crate::NotifyResult;
use async_trait::async_trait;
use portal_api::ApiClient;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCountResponse {
    unread_count: u64,
}

/// Server-facing notification operations.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Authoritative unread count.
    async fn unread_count(&self) -> NotifyResult<u64>;

    /// Mark the given notifications read.
    async fn mark_read(&self, ids: &[i64]) -> NotifyResult<()>;

    /// Mark every notification read.
    async fn mark_all_read(&self) -> NotifyResult<()>;

    /// Delete the given notifications.
    async fn delete(&self, ids: &[i64]) -> NotifyResult<()>;
}

/// REST implementation riding the gated client, so every call gets the
/// token-attach and 401-refresh-retry behavior.
pub struct RestNotificationApi {
    client: ApiClient,
}

impl RestNotificationApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationApi for RestNotificationApi {
    async fn unread_count(&self) -> NotifyResult<u64> {
        let response: UnreadCountResponse = self.client.get("/notifications/unread-count").await?;
        Ok(response.unread_count)
    }

    async fn mark_read(&self, ids: &[i64]) -> NotifyResult<()> {
        let _: serde_json::Value = self
            .client
            .put("/notifications/read", &serde_json::json!({ "ids": ids }))
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> NotifyResult<()> {
        let _: serde_json::Value = self
            .client
            .put("/notifications/read-all", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> NotifyResult<()> {
        let _: serde_json::Value = self
            .client
            .delete("/notifications", &serde_json::json!({ "ids": ids }))
            .await?;
        Ok(())
    }
}
