//! Live discovery
//!
//! One loop per organization tails the change listing from the newest
//! change onwards and forwards a notification per record through the
//! organization's pause gate into the shared pipeline. A failed page fetch
//! ends the stream; the loop restarts it from the last position it saw.

use futures_util::StreamExt;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::SyncNotification;
use crate::pipeline::{run_with_retry, PauseRegistry, Publisher, RetryPolicy, ScopedForwarder};
use crate::streamer::{BackoffSchedule, ChangeCursorStreamer, StreamMode, StreamScope};
use crate::types::{Result, SyncError};

/// Delay before a failed stream is started again
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct LiveSync {
    streamer: ChangeCursorStreamer,
    pauses: PauseRegistry,
    publisher: Publisher<SyncNotification>,
    schedule: BackoffSchedule,
    seed_policy: RetryPolicy,
    forward_buffer: usize,
    restart_delay: Duration,
}

impl LiveSync {
    pub fn new(
        streamer: ChangeCursorStreamer,
        pauses: PauseRegistry,
        publisher: Publisher<SyncNotification>,
        schedule: BackoffSchedule,
        seed_policy: RetryPolicy,
        forward_buffer: usize,
    ) -> Self {
        Self {
            streamer,
            pauses,
            publisher,
            schedule,
            seed_policy,
            forward_buffer,
            restart_delay: RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Start one discovery loop per organization
    pub fn spawn_all(&self, orgs: impl IntoIterator<Item = String>, cancel: &CancellationToken) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for org in orgs {
            let live = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                if let Err(e) = live.run_organization(&org, cancel).await {
                    warn!(org = %org, error = %e, "Live discovery stopped");
                }
            });
        }
        tasks
    }

    /// Discover changes for `org` until cancelled
    pub async fn run_organization(&self, org: &str, cancel: CancellationToken) -> Result<()> {
        let forwarder = ScopedForwarder::spawn(
            org,
            self.forward_buffer,
            &self.pauses,
            self.publisher.clone(),
            cancel.clone(),
        );

        let result = self.discover(org, &forwarder, &cancel).await;

        let forwarded = forwarder.finish().await;
        self.pauses.evict(org);
        info!(org, forwarded, "Live discovery finished");

        match result {
            Err(SyncError::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn discover(
        &self,
        org: &str,
        forwarder: &ScopedForwarder<SyncNotification>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let scope = StreamScope::organization(org);
        let what = format!("live cursor for {}", org);
        let mut cursor = run_with_retry(&self.seed_policy, cancel, &what, || {
            self.streamer.live_cursor(&scope)
        })
        .await?;
        info!(org, position = ?cursor.position(), "Live discovery started");

        loop {
            let mut changes = self.streamer.stream(
                scope.clone(),
                cursor.clone(),
                StreamMode::Tail(self.schedule.clone()),
                cancel.clone(),
            );

            while let Some(change) = changes.next().await {
                match change {
                    Ok(record) => {
                        cursor.advance(record.last_changed_at);
                        forwarder.send(record.into_notification(false)).await?;
                    }
                    // The stream ends after yielding its error
                    Err(e) => debug!(org, error = %e, "Change stream failed"),
                }
            }

            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            warn!(
                org,
                delay_ms = self.restart_delay.as_millis() as u64,
                "Restarting change stream"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
    }
}
