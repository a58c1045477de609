//! Hands partitions to whoever executes them

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::runner::PartitionRunner;
use crate::model::Partition;
use crate::nats::{NatsClient, PARTITION_SUBJECT};
use crate::types::Result;

/// Unit of migration work on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionMessage {
    pub partition: Partition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}

#[async_trait]
pub trait PartitionDispatcher: Send + Sync {
    async fn dispatch(&self, message: PartitionMessage) -> Result<()>;
}

/// One JetStream message per partition, executed by the workers
pub struct NatsPartitionDispatcher {
    client: NatsClient,
}

impl NatsPartitionDispatcher {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartitionDispatcher for NatsPartitionDispatcher {
    async fn dispatch(&self, message: PartitionMessage) -> Result<()> {
        self.client.publish_json(PARTITION_SUBJECT, &message).await?;
        debug!(partition = %message.partition, "Dispatched partition");
        Ok(())
    }
}

/// Runs partitions as tasks in this process, at most `max_concurrent` at a
/// time. A partition already running here is not started again.
pub struct LocalDispatcher {
    runner: Arc<PartitionRunner>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashSet<Partition>>,
    tasks: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
}

impl LocalDispatcher {
    pub fn new(runner: Arc<PartitionRunner>, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            runner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(DashSet::new()),
            tasks: Mutex::new(JoinSet::new()),
            cancel,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for every partition dispatched so far
    pub async fn join_all(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Partition task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl PartitionDispatcher for LocalDispatcher {
    async fn dispatch(&self, message: PartitionMessage) -> Result<()> {
        if !self.in_flight.insert(message.partition.clone()) {
            info!(partition = %message.partition, "Partition already running, not dispatched");
            return Ok(());
        }

        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let cancel = self.cancel.clone();

        self.tasks.lock().await.spawn(async move {
            let partition = message.partition.clone();
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            if permit.is_some() {
                if let Err(e) = runner.run(&message, &cancel).await {
                    error!(partition = %partition, error = %e, "Partition failed");
                }
            }
            in_flight.remove(&partition);
        });
        Ok(())
    }
}
