use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use super::PartitionCheckpointStore;
use crate::model::{Partition, PartitionCheckpoint};
use crate::types::Result;

/// Process-local checkpoint store for development mode and tests
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<Partition, PartitionCheckpoint>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All checkpoints ordered by day, then organization
    pub fn snapshot(&self) -> Vec<PartitionCheckpoint> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.partition.cmp(&b.partition));
        all
    }
}

#[async_trait]
impl PartitionCheckpointStore for InMemoryCheckpointStore {
    async fn existing_partitions(&self, partitions: &[Partition]) -> Result<Vec<Partition>> {
        Ok(partitions
            .iter()
            .filter(|p| self.entries.contains_key(*p))
            .cloned()
            .collect())
    }

    async fn get(&self, day: NaiveDate, organization: &str) -> Result<Option<PartitionCheckpoint>> {
        Ok(self
            .entries
            .get(&Partition::new(day, organization))
            .map(|e| e.value().clone()))
    }

    async fn upsert(&self, checkpoints: &[PartitionCheckpoint]) -> Result<()> {
        for checkpoint in checkpoints {
            self.entries
                .insert(checkpoint.partition.clone(), checkpoint.clone());
        }
        Ok(())
    }

    async fn truncate(&self) -> Result<u64> {
        let removed = self.entries.len() as u64;
        self.entries.clear();
        Ok(removed)
    }
}
