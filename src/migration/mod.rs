//! Historical backfill
//!
//! A date range is split into (day, organization) partitions. Each partition
//! is dispatched on its own and walked backwards by a [`PartitionRunner`]
//! that checkpoints its progress, so an interrupted run resumes where it
//! stopped and a completed one is skipped by later runs.

mod command;
mod dispatch;
mod runner;
mod scheduler;
mod sink;

pub use command::{expand_partitions, MigrationCommand};
pub use dispatch::{LocalDispatcher, NatsPartitionDispatcher, PartitionDispatcher, PartitionMessage};
pub use runner::PartitionRunner;
pub use scheduler::{MigrationPlan, MigrationScheduler};
pub use sink::{NatsNotificationSink, NotificationSink};
