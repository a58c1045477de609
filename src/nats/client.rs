//! NATS JetStream client wrapper
//!
//! Connection management plus the stream and durable consumers used for
//! partition dispatch and migration notifications.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream};
use async_nats::{Client, ConnectOptions};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use super::messages::{encode, STREAM_NAME, SUBJECT_PREFIX};
use crate::config::NatsArgs;
use crate::types::{Result, SyncError};

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Messages older than this are dropped from the stream
const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Time a consumer has to ack before redelivery
const ACK_WAIT: Duration = Duration::from_secs(300);

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    name: String,
}

impl NatsClient {
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        // No retry_on_initial_connect: fail fast when NATS is missing
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| SyncError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            name: name.to_string(),
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the `DIALOG_SYNC` stream if it does not exist
    pub async fn ensure_stream(&self) -> Result<Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![format!("{}.>", SUBJECT_PREFIX)],
                max_age: STREAM_MAX_AGE,
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| SyncError::Nats(format!("Failed to create stream: {e}")))?;

        info!("Using stream {} with subjects {}.>", STREAM_NAME, SUBJECT_PREFIX);
        Ok(stream)
    }

    /// Durable pull consumer shared by every worker instance
    pub async fn pull_consumer(
        &self,
        durable: &str,
        filter_subject: &str,
        max_ack_pending: usize,
    ) -> Result<PullConsumer> {
        let stream = self.ensure_stream().await?;
        let consumer = stream
            .get_or_create_consumer(
                durable,
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    filter_subject: filter_subject.to_string(),
                    max_ack_pending: max_ack_pending as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SyncError::Nats(format!("Failed to create consumer: {e}")))?;

        info!(durable, filter_subject, "Using consumer");
        Ok(consumer)
    }

    /// Publish JSON to the stream and wait for the server ack
    pub async fn publish_json<T: Serialize>(&self, subject: &str, message: &T) -> Result<()> {
        let payload = encode(message)?;
        self.jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| SyncError::Nats(format!("Publish failed: {}", e)))?
            .await
            .map_err(|e| SyncError::Nats(format!("Publish not acknowledged: {}", e)))?;
        Ok(())
    }
}
