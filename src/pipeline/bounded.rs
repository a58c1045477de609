//! Bounded work queue drained by a fixed pool of consumers
//!
//! Producers publish into a fixed-capacity channel and wait when it is full.
//! Consumers share the receiving end and handle one item at a time.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry::{run_with_retry, RetryPolicy};
use crate::types::{Result, SyncError};

/// Processes one item
#[async_trait]
pub trait ItemHandler<T>: Send + Sync {
    async fn handle(&self, item: &T) -> Result<()>;
}

/// Receives items the retry policy gave up on
#[async_trait]
pub trait DeadLetterSink<T>: Send + Sync {
    async fn park(&self, item: &T, error: &SyncError) -> Result<()>;
}

/// What a consumer does when the handler fails
pub enum FailureMode<T> {
    /// Log and move on
    LogAndContinue,
    /// Retry per policy, then park
    Retry {
        policy: RetryPolicy,
        dead_letters: Arc<dyn DeadLetterSink<T>>,
    },
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Used in log lines
    pub name: String,
    pub consumers: usize,
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            consumers: 4,
            capacity: 1000,
        }
    }
}

/// Counters shared by all consumers
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub handled: AtomicU64,
    pub failed: AtomicU64,
    pub parked: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.handled.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.parked.load(Ordering::Relaxed),
        )
    }
}

/// Cloneable producer handle
pub struct Publisher<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> Publisher<T> {
    /// Enqueue, waiting while the queue is full
    pub async fn publish(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| SyncError::Internal("Pipeline closed".into()))
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

pub struct BoundedPipeline<T> {
    publisher: Publisher<T>,
    closing: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
    name: String,
}

enum Next<T> {
    Item(T),
    Drain,
    Stop,
}

impl<T: Send + Sync + 'static> BoundedPipeline<T> {
    /// Spawn the consumers and return the running pipeline
    pub fn start(
        config: PipelineConfig,
        handler: Arc<dyn ItemHandler<T>>,
        failure: FailureMode<T>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<T>(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let failure = Arc::new(failure);
        let stats = Arc::new(PipelineStats::default());
        let closing = CancellationToken::new();

        info!(
            pipeline = %config.name,
            consumers = config.consumers,
            capacity = config.capacity,
            "Starting pipeline"
        );

        let workers = (0..config.consumers.max(1))
            .map(|id| {
                let consumer = Consumer {
                    id,
                    name: config.name.clone(),
                    queue: Arc::clone(&rx),
                    handler: Arc::clone(&handler),
                    failure: Arc::clone(&failure),
                    stats: Arc::clone(&stats),
                    cancel: cancel.clone(),
                    closing: closing.clone(),
                };
                tokio::spawn(consumer.run())
            })
            .collect();

        Self {
            publisher: Publisher { tx },
            closing,
            workers,
            stats,
            name: config.name,
        }
    }

    pub async fn publish(&self, item: T) -> Result<()> {
        self.publisher.publish(item).await
    }

    pub fn publisher(&self) -> Publisher<T> {
        self.publisher.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting items, let the consumers drain the queue, join them
    pub async fn shutdown(self) {
        self.closing.cancel();
        drop(self.publisher);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(pipeline = %self.name, "Consumer task failed: {}", e);
            }
        }
        let (handled, failed, parked) = self.stats.snapshot();
        info!(pipeline = %self.name, handled, failed, parked, "Pipeline stopped");
    }
}

struct Consumer<T> {
    id: usize,
    name: String,
    queue: Arc<Mutex<mpsc::Receiver<T>>>,
    handler: Arc<dyn ItemHandler<T>>,
    failure: Arc<FailureMode<T>>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    closing: CancellationToken,
}

impl<T: Send + Sync + 'static> Consumer<T> {
    async fn run(self) {
        debug!(pipeline = %self.name, consumer = self.id, "Consumer started");
        loop {
            let item = match self.next().await {
                Some(item) => item,
                None => break,
            };

            if !self.process(&item).await {
                break;
            }
        }
        debug!(pipeline = %self.name, consumer = self.id, "Consumer stopped");
    }

    async fn next(&self) -> Option<T> {
        let mut rx = self.queue.lock().await;
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Next::Stop,
            item = rx.recv() => item.map_or(Next::Stop, Next::Item),
            _ = self.closing.cancelled() => Next::Drain,
        };
        match next {
            Next::Item(item) => Some(item),
            Next::Stop => None,
            Next::Drain => {
                rx.close();
                rx.recv().await
            }
        }
    }

    /// Returns `false` when the consumer should stop
    async fn process(&self, item: &T) -> bool {
        match self.failure.as_ref() {
            FailureMode::LogAndContinue => {
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => return false,
                    result = self.handler.handle(item) => result,
                };
                match result {
                    Ok(()) => {
                        self.stats.handled.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(pipeline = %self.name, consumer = self.id, error = %e, "Item failed");
                    }
                }
                true
            }
            FailureMode::Retry {
                policy,
                dead_letters,
            } => {
                let result = run_with_retry(policy, &self.cancel, &self.name, || {
                    self.handler.handle(item)
                })
                .await;
                match result {
                    Ok(()) => {
                        self.stats.handled.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(SyncError::Cancelled) => false,
                    Err(e) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!(pipeline = %self.name, consumer = self.id, error = %e, "Item gave up, parking");
                        match dead_letters.park(item, &e).await {
                            Ok(()) => {
                                self.stats.parked.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(pe) => {
                                error!(pipeline = %self.name, error = %pe, "Failed to park item");
                            }
                        }
                        true
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl ItemHandler<u32> for Recorder {
        async fn handle(&self, item: &u32) -> Result<()> {
            self.seen.lock().await.push(*item);
            if Some(*item) == self.fail_on {
                return Err(SyncError::from_status("dialogs", 422, String::new()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Parking {
        parked: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl DeadLetterSink<u32> for Parking {
        async fn park(&self, item: &u32, _error: &SyncError) -> Result<()> {
            self.parked.lock().await.push(*item);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_consumers() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            fail_on: Some(2),
        });
        let pipeline = BoundedPipeline::start(
            PipelineConfig {
                name: "test".into(),
                consumers: 1,
                capacity: 2,
            },
            handler.clone(),
            FailureMode::LogAndContinue,
            CancellationToken::new(),
        );

        for i in 1..=5 {
            pipeline.publish(i).await.unwrap();
        }
        let stats = pipeline.stats();
        pipeline.shutdown().await;

        assert_eq!(*handler.seen.lock().await, vec![1, 2, 3, 4, 5]);
        assert_eq!(stats.snapshot(), (4, 1, 0));
    }

    #[tokio::test]
    async fn test_retry_mode_parks_after_conflicts() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            fail_on: Some(7),
        });
        let parking = Arc::new(Parking::default());
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_percent: 0,
            conflict_max_attempts: 3,
            ..Default::default()
        };
        let pipeline = BoundedPipeline::start(
            PipelineConfig {
                name: "test".into(),
                consumers: 2,
                capacity: 4,
            },
            handler.clone(),
            FailureMode::Retry {
                policy,
                dead_letters: parking.clone(),
            },
            CancellationToken::new(),
        );

        pipeline.publish(7).await.unwrap();
        pipeline.publish(8).await.unwrap();
        pipeline.shutdown().await;

        let seen = handler.seen.lock().await.clone();
        assert_eq!(seen.iter().filter(|i| **i == 7).count(), 3);
        assert_eq!(*parking.parked.lock().await, vec![7]);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_fails() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            fail_on: None,
        });
        let pipeline = BoundedPipeline::start(
            PipelineConfig::default(),
            handler,
            FailureMode::LogAndContinue,
            CancellationToken::new(),
        );
        let publisher = pipeline.publisher();
        pipeline.shutdown().await;
        assert!(publisher.publish(1).await.is_err());
    }
}
