//! Partition checkpoint document schema
//!
//! One document per (day, organization). `partition_key` holds the ISO day,
//! `row_key` the organization. The pair is unique and stable across restarts.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::model::{Partition, PartitionCheckpoint};
use crate::types::{Result, SyncError};

/// Collection name for partition checkpoints
pub const PARTITION_CHECKPOINT_COLLECTION: &str = "partition_checkpoints";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PartitionCheckpointDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// `YYYY-MM-DD`
    pub partition_key: String,

    /// Organization identifier
    pub row_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<DateTime>,

    #[serde(default)]
    pub total_count: i64,

    #[serde(default)]
    pub complete: bool,
}

impl PartitionCheckpointDoc {
    pub fn key_filter(partition: &Partition) -> Document {
        doc! {
            "partition_key": partition.partition_key(),
            "row_key": partition.row_key(),
        }
    }

    /// Fields written on every upsert
    pub fn set_fields(checkpoint: &PartitionCheckpoint) -> Document {
        doc! {
            "checkpoint": checkpoint.checkpoint.map(DateTime::from_chrono),
            "total_count": i64::try_from(checkpoint.total_count).unwrap_or(i64::MAX),
            "complete": checkpoint.complete,
        }
    }

    pub fn into_model(self) -> Result<PartitionCheckpoint> {
        let partition = Partition::from_keys(&self.partition_key, &self.row_key).ok_or_else(|| {
            SyncError::Database(format!(
                "Malformed partition key '{}' for '{}'",
                self.partition_key, self.row_key
            ))
        })?;
        Ok(PartitionCheckpoint {
            partition,
            checkpoint: self.checkpoint.map(|dt| dt.to_chrono()),
            total_count: u64::try_from(self.total_count).unwrap_or(0),
            complete: self.complete,
        })
    }
}

impl IntoIndexes for PartitionCheckpointDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "partition_key": 1, "row_key": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("partition_row_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "complete": 1 },
                Some(IndexOptions::builder().name("complete_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for PartitionCheckpointDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_document_to_model() {
        let doc = PartitionCheckpointDoc {
            partition_key: "2024-01-01".into(),
            row_key: "acme".into(),
            checkpoint: Some(DateTime::from_chrono(
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            )),
            total_count: 42,
            complete: true,
            ..Default::default()
        };
        let model = doc.into_model().unwrap();
        assert_eq!(
            model.partition,
            Partition::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "acme")
        );
        assert_eq!(model.total_count, 42);
        assert!(model.complete);
    }

    #[test]
    fn test_set_fields() {
        let partition = Partition::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "acme");
        let fields = PartitionCheckpointDoc::set_fields(&PartitionCheckpoint::fresh(partition.clone()));
        assert_eq!(fields.get_bool("complete").unwrap(), false);
        assert_eq!(fields.get_i64("total_count").unwrap(), 0);
        assert_eq!(
            PartitionCheckpointDoc::key_filter(&partition).get_str("partition_key").unwrap(),
            "2024-01-01"
        );
    }

    #[test]
    fn test_unique_index_declared() {
        let indices = PartitionCheckpointDoc::into_indices();
        assert!(indices
            .iter()
            .any(|(keys, opts)| keys.contains_key("row_key")
                && opts.as_ref().and_then(|o| o.unique) == Some(true)));
    }
}
