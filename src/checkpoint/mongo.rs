use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use bson::doc;
use chrono::NaiveDate;
use tracing::{debug, info};

use super::PartitionCheckpointStore;
use crate::db::schemas::{PartitionCheckpointDoc, PARTITION_CHECKPOINT_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::model::{Partition, PartitionCheckpoint};
use crate::types::Result;

/// Checkpoints in the `partition_checkpoints` collection
#[derive(Clone)]
pub struct MongoCheckpointStore {
    collection: MongoCollection<PartitionCheckpointDoc>,
}

impl MongoCheckpointStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client
            .collection::<PartitionCheckpointDoc>(PARTITION_CHECKPOINT_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl PartitionCheckpointStore for MongoCheckpointStore {
    async fn existing_partitions(&self, partitions: &[Partition]) -> Result<Vec<Partition>> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        // Query the cross product of days and orgs, then keep the requested pairs
        let days: BTreeSet<String> = partitions.iter().map(|p| p.partition_key()).collect();
        let orgs: BTreeSet<&str> = partitions.iter().map(|p| p.row_key()).collect();
        let filter = doc! {
            "partition_key": { "$in": days.into_iter().collect::<Vec<_>>() },
            "row_key": { "$in": orgs.into_iter().collect::<Vec<_>>() },
        };

        let found: HashSet<(String, String)> = self
            .collection
            .find_many(filter)
            .await?
            .into_iter()
            .map(|d| (d.partition_key, d.row_key))
            .collect();

        Ok(partitions
            .iter()
            .filter(|p| found.contains(&(p.partition_key(), p.row_key().to_string())))
            .cloned()
            .collect())
    }

    async fn get(&self, day: NaiveDate, organization: &str) -> Result<Option<PartitionCheckpoint>> {
        let partition = Partition::new(day, organization);
        self.collection
            .find_one(PartitionCheckpointDoc::key_filter(&partition))
            .await?
            .map(PartitionCheckpointDoc::into_model)
            .transpose()
    }

    async fn upsert(&self, checkpoints: &[PartitionCheckpoint]) -> Result<()> {
        for checkpoint in checkpoints {
            self.collection
                .upsert_one(
                    PartitionCheckpointDoc::key_filter(&checkpoint.partition),
                    PartitionCheckpointDoc::set_fields(checkpoint),
                )
                .await?;
        }
        debug!(count = checkpoints.len(), "Upserted partition checkpoints");
        Ok(())
    }

    async fn truncate(&self) -> Result<u64> {
        let result = self.collection.delete_many(doc! {}).await?;
        info!(deleted = result.deleted_count, "Truncated partition checkpoints");
        Ok(result.deleted_count)
    }
}
