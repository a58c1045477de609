//! Expands a migration request into partitions and dispatches them

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::command::{expand_partitions, MigrationCommand};
use super::dispatch::{PartitionDispatcher, PartitionMessage};
use crate::checkpoint::PartitionCheckpointStore;
use crate::clients::OrganizationCache;
use crate::model::{Partition, PartitionCheckpoint};
use crate::types::Result;

/// What a migration request turned into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    /// Partitions dispatched, or that would be for a dry run
    pub partitions: Vec<Partition>,
    /// Partitions left out because they already have a checkpoint
    pub skipped: Vec<Partition>,
    pub dry_run: bool,
}

pub struct MigrationScheduler {
    organizations: Arc<OrganizationCache>,
    checkpoints: Arc<dyn PartitionCheckpointStore>,
    dispatcher: Arc<dyn PartitionDispatcher>,
}

impl MigrationScheduler {
    pub fn new(
        organizations: Arc<OrganizationCache>,
        checkpoints: Arc<dyn PartitionCheckpointStore>,
        dispatcher: Arc<dyn PartitionDispatcher>,
    ) -> Self {
        Self {
            organizations,
            checkpoints,
            dispatcher,
        }
    }

    pub async fn migrate(&self, command: MigrationCommand) -> Result<MigrationPlan> {
        let snapshot = self.organizations.covering(command.to).await?;
        let organizations = command.resolve_organizations(&snapshot)?;
        let party = command.party();

        let mut partitions = expand_partitions(command.from, command.to, &organizations);
        let mut skipped = Vec::new();

        if !command.force && !command.dry_run {
            let existing: HashSet<Partition> = self
                .checkpoints
                .existing_partitions(&partitions)
                .await?
                .into_iter()
                .collect();
            let (kept, dropped): (Vec<_>, Vec<_>) =
                partitions.into_iter().partition(|p| !existing.contains(p));
            partitions = kept;
            skipped = dropped;
        }

        info!(
            from = %command.from,
            to = %command.to,
            organizations = organizations.len(),
            partitions = partitions.len(),
            skipped = skipped.len(),
            force = command.force,
            dry_run = command.dry_run,
            "Migration planned"
        );

        if command.dry_run {
            return Ok(MigrationPlan {
                partitions,
                skipped,
                dry_run: true,
            });
        }

        // Persisted before dispatch
        let fresh: Vec<PartitionCheckpoint> = partitions
            .iter()
            .cloned()
            .map(PartitionCheckpoint::fresh)
            .collect();
        self.checkpoints.upsert(&fresh).await?;

        for partition in &partitions {
            self.dispatcher
                .dispatch(PartitionMessage {
                    partition: partition.clone(),
                    party: party.clone(),
                })
                .await?;
        }

        Ok(MigrationPlan {
            partitions,
            skipped,
            dry_run: false,
        })
    }

    /// Forget every partition so the next migration starts from scratch
    pub async fn truncate(&self) -> Result<u64> {
        let removed = self.checkpoints.truncate().await?;
        info!(removed, "Partition checkpoints truncated");
        Ok(removed)
    }
}
