//! Database schemas for dialog-sync

mod metadata;
mod partition_checkpoint;

pub use metadata::Metadata;
pub use partition_checkpoint::{PartitionCheckpointDoc, PARTITION_CHECKPOINT_COLLECTION};
