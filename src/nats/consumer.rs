//! Pull loop over a durable JetStream consumer

use async_nats::jetstream::{self, consumer::PullConsumer, AckKind};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::decode;
use crate::types::{Result, SyncError};

/// A decoded message that still owes the server an ack
pub struct Delivery<T> {
    pub payload: T,
    message: jetstream::Message,
}

impl<T> Delivery<T> {
    pub fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    /// Times the server has delivered this message, starting at 1
    pub fn delivered(&self) -> i64 {
        self.message.info().map(|i| i.delivered).unwrap_or(1)
    }

    pub async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| SyncError::Nats(format!("Ack failed: {}", e)))
    }

    /// Reset the server's ack timer for long-running work
    pub async fn in_progress(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Progress)
            .await
            .map_err(|e| SyncError::Nats(format!("Progress ack failed: {}", e)))
    }

    /// Ask for redelivery, optionally after `delay`
    pub async fn nak(&self, delay: Option<Duration>) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(delay))
            .await
            .map_err(|e| SyncError::Nats(format!("Nak failed: {}", e)))
    }
}

/// Fetch batches until `cancel` fires, handing each decoded message to
/// `on_message`. Malformed payloads are acked and dropped.
pub async fn consume<T, F, Fut>(
    consumer: PullConsumer,
    batch: usize,
    cancel: CancellationToken,
    mut on_message: F,
) where
    T: DeserializeOwned,
    F: FnMut(Delivery<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    info!(batch, "Starting JetStream pull loop");

    while !cancel.is_cancelled() {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            fetched = consumer
                .fetch()
                .max_messages(batch.max(1))
                .expires(Duration::from_secs(5))
                .messages() => fetched,
        };

        let mut messages = match fetched {
            Ok(messages) => messages,
            Err(e) => {
                error!("Failed to fetch messages: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                continue;
            }
        };

        let mut count = 0usize;
        while let Some(msg_result) = messages.next().await {
            let message = match msg_result {
                Ok(message) => message,
                Err(e) => {
                    warn!("Error receiving message: {}", e);
                    continue;
                }
            };
            count += 1;

            match decode::<T>(&message.payload) {
                Ok(payload) => on_message(Delivery { payload, message }).await,
                Err(e) => {
                    error!(subject = %message.subject, "Dropping malformed message: {}", e);
                    if let Err(e) = message.ack().await {
                        warn!("Failed to ack malformed message: {}", e);
                    }
                }
            }
        }

        if count > 0 {
            debug!("Processed {} messages", count);
        }
    }

    info!("JetStream pull loop stopped");
}
