//! Partition checkpoint persistence
//!
//! Migration progress is stored per (day, organization). The store is the
//! only durable state of a migration: a restarted run reads the checkpoint
//! back and resumes below it.

mod memory;
mod mongo;

pub use memory::InMemoryCheckpointStore;
pub use mongo::MongoCheckpointStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{Partition, PartitionCheckpoint};
use crate::types::Result;

#[async_trait]
pub trait PartitionCheckpointStore: Send + Sync {
    /// The subset of `partitions` that already has a checkpoint
    async fn existing_partitions(&self, partitions: &[Partition]) -> Result<Vec<Partition>>;

    async fn get(&self, day: NaiveDate, organization: &str) -> Result<Option<PartitionCheckpoint>>;

    async fn upsert(&self, checkpoints: &[PartitionCheckpoint]) -> Result<()>;

    /// Remove every checkpoint
    async fn truncate(&self) -> Result<u64>;
}
