//! Poll backoff for a quiet change feed

use rand::Rng;
use std::time::Duration;

/// Ordered delays plus a jitter percentage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
    jitter_percent: u8,
}

impl BackoffSchedule {
    /// `delays` should be ordered shortest first. An empty list means "poll immediately".
    pub fn new(delays: Vec<Duration>, jitter_percent: u8) -> Self {
        Self {
            delays,
            jitter_percent: jitter_percent.min(100),
        }
    }

    pub fn handle(&self) -> BackoffHandle {
        BackoffHandle {
            schedule: self.clone(),
            index: 0,
        }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(
            [1, 2, 5, 10, 30]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            10,
        )
    }
}

/// Position in a schedule
#[derive(Debug, Clone)]
pub struct BackoffHandle {
    schedule: BackoffSchedule,
    index: usize,
}

impl BackoffHandle {
    /// Base delay at the current position, capped at the longest entry
    pub fn current(&self) -> Duration {
        let delays = &self.schedule.delays;
        if delays.is_empty() {
            return Duration::ZERO;
        }
        delays[self.index.min(delays.len() - 1)]
    }

    /// Jittered delay to sleep now; moves one step along the schedule
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current();
        if self.index + 1 < self.schedule.delays.len() {
            self.index += 1;
        }
        jitter(base, self.schedule.jitter_percent)
    }

    /// Back to the shortest delay
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

fn jitter(base: Duration, percent: u8) -> Duration {
    if percent == 0 || base.is_zero() {
        return base;
    }
    let spread = base.as_millis() as f64 * f64::from(percent) / 100.0;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((base.as_millis() as f64 + offset).max(0.0) as u64)
}
