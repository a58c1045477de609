//! Pipeline adapters for JetStream deliveries
//!
//! A delivery is acked once its notification was reconciled or parked. A
//! delivery abandoned by shutdown is left unacked and comes back after the
//! ack wait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::client::NatsClient;
use super::consumer::Delivery;
use super::messages::{ParkedNotification, PARKED_SUBJECT};
use crate::model::SyncNotification;
use crate::pipeline::{DeadLetterSink, ItemHandler};
use crate::types::{Result, SyncError};

/// Runs the inner handler on the payload and acks on success
pub struct AckOnSuccess<T> {
    inner: Arc<dyn ItemHandler<T>>,
}

impl<T> AckOnSuccess<T> {
    pub fn new(inner: Arc<dyn ItemHandler<T>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Send + Sync> ItemHandler<Delivery<T>> for AckOnSuccess<T> {
    async fn handle(&self, item: &Delivery<T>) -> Result<()> {
        self.inner.handle(&item.payload).await?;
        if let Err(e) = item.ack().await {
            // Reconciliation is idempotent, a redelivery is harmless
            warn!(subject = item.subject(), error = %e, "Ack after success failed");
        }
        Ok(())
    }
}

/// Publishes gave-up notifications to the parking subject, then acks them
pub struct ParkingSink {
    client: NatsClient,
    node_id: String,
}

impl ParkingSink {
    pub fn new(client: NatsClient, node_id: impl Into<String>) -> Self {
        Self {
            client,
            node_id: node_id.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink<Delivery<SyncNotification>> for ParkingSink {
    async fn park(&self, item: &Delivery<SyncNotification>, error: &SyncError) -> Result<()> {
        let parked = ParkedNotification::new(item.payload.clone(), error, &self.node_id);
        self.client.publish_json(PARKED_SUBJECT, &parked).await?;
        item.ack().await
    }
}
