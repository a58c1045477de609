//! Per-scope hop between discovery and the shared pipeline
//!
//! Discovery writes into a small buffer owned by the scope. The forwarder
//! task waits on the scope's pause gate before each publish, so a paused
//! scope stops delivering while its discovery keeps running until the buffer
//! fills. Items leave in the order they arrived.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bounded::Publisher;
use super::pause::PauseRegistry;
use crate::types::{Result, SyncError};

pub struct ScopedForwarder<T> {
    scope: String,
    tx: mpsc::Sender<T>,
    task: JoinHandle<u64>,
}

impl<T: Send + 'static> ScopedForwarder<T> {
    pub fn spawn(
        scope: impl Into<String>,
        buffer: usize,
        registry: &PauseRegistry,
        publisher: Publisher<T>,
        cancel: CancellationToken,
    ) -> Self {
        let scope = scope.into();
        let (tx, mut rx) = mpsc::channel::<T>(buffer.max(1));
        let lease = registry.lease(&scope);
        let task_scope = scope.clone();

        let task = tokio::spawn(async move {
            let mut forwarded = 0u64;
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = lease.wait_unpaused() => {}
                }

                let published = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = publisher.publish(item) => result,
                };
                if let Err(e) = published {
                    warn!(scope = %task_scope, error = %e, "Forwarder stopping, pipeline closed");
                    break;
                }
                forwarded += 1;
            }
            debug!(scope = %task_scope, forwarded, "Forwarder finished");
            forwarded
        });

        Self { scope, tx, task }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Hand an item to the forwarder, waiting only while the buffer is full
    pub async fn send(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| SyncError::Internal(format!("Forwarder for {} stopped", self.scope)))
    }

    /// Items waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Close the buffer, wait until everything buffered was forwarded.
    /// Returns the number of items forwarded.
    pub async fn finish(self) -> u64 {
        drop(self.tx);
        match self.task.await {
            Ok(count) => count,
            Err(e) => {
                warn!(scope = %self.scope, "Forwarder task failed: {}", e);
                0
            }
        }
    }
}
