//! Internal staff notifications raised by workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::models::NotificationLevel;

/// A notification shown to a shop's staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopNotification {
    pub shop_id: i64,
    pub workflow_id: i64,
    pub title: String,
    pub content: String,
    pub level: NotificationLevel,
    pub created_at: DateTime<Utc>,
}

/// Result of a notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    Delivered,
    Failed(String),
}

impl NotificationResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotificationResult::Delivered)
    }
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &ShopNotification) -> NotificationResult;
}

/// Notification sink that writes to the log.
///
/// Keeps what it delivered so tests can inspect it.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationSink {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    delivered: Arc<Mutex<Vec<ShopNotification>>>,
}

impl LoggingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<ShopNotification> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, notification: &ShopNotification) -> NotificationResult {
        if self.simulate_failure {
            tracing::warn!(
                shop_id = notification.shop_id,
                workflow_id = notification.workflow_id,
                "Notification sink simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            shop_id = notification.shop_id,
            workflow_id = notification.workflow_id,
            level = notification.level.as_str(),
            title = %notification.title,
            "Shop notification raised"
        );

        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification.clone());
        }
        NotificationResult::Delivered
    }
}
