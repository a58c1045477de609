//! Paginated change listing as an ordered stream

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BackoffSchedule, Cursor, StreamScope};
use crate::clients::{InstanceQuery, OriginStore, MAX_PAGE_SIZE};
use crate::model::ChangeRecord;
use crate::types::Result;

/// What to do when the listing runs dry
#[derive(Debug, Clone)]
pub enum StreamMode {
    /// Sleep on the schedule and poll again
    Tail(BackoffSchedule),
    /// End the stream
    Once,
}

/// Turns the origin store's instance listing into a stream of changes
#[derive(Clone)]
pub struct ChangeCursorStreamer {
    origin: Arc<dyn OriginStore>,
    page_size: usize,
}

impl ChangeCursorStreamer {
    pub fn new(origin: Arc<dyn OriginStore>, page_size: usize) -> Self {
        Self {
            origin,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Lazy stream of changes starting at `cursor`.
    ///
    /// A page fetch failure is yielded once and ends the stream; restarting
    /// from the last observed position is up to the caller.
    pub fn stream(
        &self,
        scope: StreamScope,
        mut cursor: Cursor,
        mode: StreamMode,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<ChangeRecord>> {
        let origin = Arc::clone(&self.origin);
        let page_size = self.page_size;

        Box::pin(stream! {
            let mut backoff = match &mode {
                StreamMode::Tail(schedule) => Some(schedule.handle()),
                StreamMode::Once => None,
            };

            loop {
                let query = InstanceQuery::new(scope.clone(), cursor.clone(), page_size);
                let mut fetched = tokio::select! {
                    _ = cancel.cancelled() => return,
                    page = origin.query_instances(&query) => page,
                };
                let mut observed = 0usize;

                loop {
                    let page = match fetched {
                        Ok(page) => page,
                        Err(e) => {
                            warn!(org = %scope.org, error = %e, "Change listing fetch failed");
                            yield Err(e);
                            return;
                        }
                    };

                    for instance in &page.instances {
                        match ChangeRecord::from_instance(instance) {
                            Ok(record) => {
                                cursor.advance(record.last_changed_at);
                                observed += 1;
                                yield Ok(record);
                            }
                            Err(e) => {
                                warn!(org = %scope.org, instance = %instance.id, error = %e, "Skipping malformed instance");
                            }
                        }
                    }

                    let Some(next) = page.next else { break };
                    fetched = tokio::select! {
                        _ = cancel.cancelled() => return,
                        page = origin.next_instances(&next) => page,
                    };
                }

                let Some(handle) = backoff.as_mut() else { return };
                if observed > 0 {
                    handle.reset();
                }
                let delay = handle.next_delay();
                debug!(
                    org = %scope.org,
                    observed,
                    delay_ms = delay.as_millis() as u64,
                    "Change listing exhausted"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        })
    }

    /// Newest `last_changed` in scope, used to seed a live cursor
    pub async fn latest_change(&self, scope: &StreamScope) -> Result<Option<DateTime<Utc>>> {
        let query = InstanceQuery::new(scope.clone(), Cursor::descending(None, None), 1);
        let page = self.origin.query_instances(&query).await?;
        Ok(page.instances.first().map(|i| i.last_changed))
    }

    /// Ascending cursor positioned at the newest change, so a live tail only
    /// sees what happens from now on
    pub async fn live_cursor(&self, scope: &StreamScope) -> Result<Cursor> {
        Ok(Cursor::ascending(self.latest_change(scope).await?))
    }
}
