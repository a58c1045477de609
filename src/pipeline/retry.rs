//! Retry policy for deliveries and partition runs

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::types::{ErrorClass, Result, SyncError};

/// Capped exponential backoff with jitter, bounded attempts for conflicts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_percent: u8,
    /// Attempts for conflict errors before giving up
    pub conflict_max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_percent: 20,
            conflict_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Base delay after `attempt` failures (1-based), before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1).min(63) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * exp)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter_percent == 0 || base.is_zero() {
            return base;
        }
        let spread = base.as_millis() as f64 * f64::from(self.jitter_percent.min(100)) / 100.0;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let millis = (base.as_millis() as f64 + offset).clamp(0.0, self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// What to do after the `attempt`-th failure
    pub fn decide(&self, err: &SyncError, attempt: u32) -> RetryDecision {
        let retry = match err.class() {
            ErrorClass::Transient => true,
            ErrorClass::Conflict => attempt < self.conflict_max_attempts,
            ErrorClass::Permanent | ErrorClass::Unreachable | ErrorClass::Cancelled => false,
        };
        if retry {
            RetryDecision::RetryAfter(self.jittered(self.base_delay(attempt)))
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Run `op` until it succeeds, the policy gives up or `cancel` fires.
///
/// Cancellation is checked before every attempt and during every sleep and
/// surfaces as [`SyncError::Cancelled`].
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        attempt = attempt.saturating_add(1);

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match policy.decide(&err, attempt) {
            RetryDecision::GiveUp => return Err(err),
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after failure"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
