//! Migration partitions and their checkpoints

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One (calendar day, organization) unit of migration work
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub day: NaiveDate,
    pub organization: String,
}

impl Partition {
    pub fn new(day: NaiveDate, organization: impl Into<String>) -> Self {
        Self {
            day,
            organization: organization.into(),
        }
    }

    /// Storage partition key: the ISO date of the day
    pub fn partition_key(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }

    /// Storage row key: the organization identifier
    pub fn row_key(&self) -> &str {
        &self.organization
    }

    /// Rebuild a partition from its storage keys
    pub fn from_keys(partition_key: &str, row_key: &str) -> Option<Self> {
        NaiveDate::parse_from_str(partition_key, "%Y-%m-%d")
            .ok()
            .map(|day| Self::new(day, row_key))
    }

    /// First instant of the day (inclusive)
    pub fn day_start(&self) -> DateTime<Utc> {
        self.day.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last instant of the day (inclusive), one nanosecond before the next midnight
    pub fn day_end(&self) -> DateTime<Utc> {
        self.day_start() + Duration::days(1) - Duration::nanoseconds(1)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key(), self.organization)
    }
}

/// Persisted progress of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionCheckpoint {
    pub partition: Partition,
    /// Lowest `last_changed` observed so far; the next run resumes from here
    pub checkpoint: Option<DateTime<Utc>>,
    pub total_count: u64,
    pub complete: bool,
}

impl PartitionCheckpoint {
    /// Checkpoint for a partition that has never run
    pub fn fresh(partition: Partition) -> Self {
        Self {
            partition,
            checkpoint: None,
            total_count: 0,
            complete: false,
        }
    }

    /// Upper bound for the next traversal of this partition
    pub fn upper_bound(&self) -> DateTime<Utc> {
        self.checkpoint.unwrap_or_else(|| self.partition.day_end())
    }

    /// Record one observed instance. Counts every observation, duplicates included.
    pub fn observe(&mut self, last_changed: DateTime<Utc>) {
        self.total_count += 1;
        self.checkpoint = Some(match self.checkpoint {
            Some(current) => current.min(last_changed),
            None => last_changed,
        });
    }
}
