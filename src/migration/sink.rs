//! Where a partition run sends its notifications

use async_trait::async_trait;

use crate::model::SyncNotification;
use crate::nats::{NatsClient, NOTIFICATION_SUBJECT};
use crate::pipeline::Publisher;
use crate::types::Result;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: SyncNotification) -> Result<()>;
}

/// In-process: straight into the reconciliation pipeline
#[async_trait]
impl NotificationSink for Publisher<SyncNotification> {
    async fn send(&self, notification: SyncNotification) -> Result<()> {
        self.publish(notification).await
    }
}

/// Durable: onto the notification subject for the workers
pub struct NatsNotificationSink {
    client: NatsClient,
}

impl NatsNotificationSink {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for NatsNotificationSink {
    async fn send(&self, notification: SyncNotification) -> Result<()> {
        self.client
            .publish_json(NOTIFICATION_SUBJECT, &notification)
            .await
    }
}
