//! Executes one migration partition
//!
//! Walks the partition's day backwards from its checkpoint, emits a
//! migration notification per instance and keeps the checkpoint at the
//! oldest change seen. The upper bound is inclusive, so instances sharing
//! the checkpoint timestamp are seen again after a resume and counted twice.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::PartitionMessage;
use super::sink::NotificationSink;
use crate::checkpoint::PartitionCheckpointStore;
use crate::model::PartitionCheckpoint;
use crate::pipeline::{run_with_retry, RetryPolicy};
use crate::streamer::{ChangeCursorStreamer, Cursor, StreamMode, StreamScope};
use crate::types::{Result, SyncError};

pub struct PartitionRunner {
    streamer: ChangeCursorStreamer,
    checkpoints: Arc<dyn PartitionCheckpointStore>,
    sink: Arc<dyn NotificationSink>,
    policy: RetryPolicy,
    checkpoint_every: u64,
}

impl PartitionRunner {
    pub fn new(
        streamer: ChangeCursorStreamer,
        checkpoints: Arc<dyn PartitionCheckpointStore>,
        sink: Arc<dyn NotificationSink>,
        policy: RetryPolicy,
        checkpoint_every: u64,
    ) -> Self {
        Self {
            streamer,
            checkpoints,
            sink,
            policy,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    /// Run the partition to completion, retrying per policy
    pub async fn run(
        &self,
        message: &PartitionMessage,
        cancel: &CancellationToken,
    ) -> Result<PartitionCheckpoint> {
        let what = message.partition.to_string();
        run_with_retry(&self.policy, cancel, &what, || self.run_once(message, cancel)).await
    }

    async fn run_once(
        &self,
        message: &PartitionMessage,
        cancel: &CancellationToken,
    ) -> Result<PartitionCheckpoint> {
        let partition = &message.partition;
        let mut checkpoint = match self
            .checkpoints
            .get(partition.day, &partition.organization)
            .await?
        {
            Some(existing) => existing,
            None => {
                let fresh = PartitionCheckpoint::fresh(partition.clone());
                self.checkpoints.upsert(std::slice::from_ref(&fresh)).await?;
                fresh
            }
        };

        if checkpoint.complete {
            debug!(partition = %partition, "Partition already complete");
            return Ok(checkpoint);
        }

        info!(
            partition = %partition,
            upper_bound = %checkpoint.upper_bound(),
            total_count = checkpoint.total_count,
            "Running partition"
        );

        let scope = StreamScope::organization(partition.organization.clone())
            .with_party(message.party.clone());
        let cursor = Cursor::descending(Some(checkpoint.upper_bound()), Some(partition.day_start()));
        let mut stream = self
            .streamer
            .stream(scope, cursor, StreamMode::Once, cancel.clone());

        let mut unsaved = 0u64;
        let outcome: Result<()> = async {
            while let Some(item) = stream.next().await {
                let record = item?;
                let last_changed = record.last_changed_at;
                self.sink.send(record.into_notification(true)).await?;
                checkpoint.observe(last_changed);

                unsaved += 1;
                if unsaved >= self.checkpoint_every {
                    self.checkpoints.upsert(std::slice::from_ref(&checkpoint)).await?;
                    unsaved = 0;
                }
            }
            // The stream also ends quietly on cancellation
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            Ok::<(), SyncError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                checkpoint.complete = true;
                self.checkpoints.upsert(std::slice::from_ref(&checkpoint)).await?;
                info!(
                    partition = %partition,
                    total_count = checkpoint.total_count,
                    "Partition complete"
                );
                Ok(checkpoint)
            }
            Err(e) => {
                if let Err(save_err) = self.checkpoints.upsert(std::slice::from_ref(&checkpoint)).await {
                    warn!(partition = %partition, error = %save_err, "Failed to save checkpoint");
                }
                warn!(
                    partition = %partition,
                    checkpoint = ?checkpoint.checkpoint,
                    error = %e,
                    "Partition interrupted"
                );
                Err(e)
            }
        }
    }
}
