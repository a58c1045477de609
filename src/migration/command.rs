//! Migration request and its validation

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::clients::OrganizationSnapshot;
use crate::model::Partition;
use crate::types::{Result, SyncError};

/// Backfill request accepted by the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCommand {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Empty or absent means every known organization
    #[serde(default)]
    pub organizations: Option<Vec<String>>,
    #[serde(default)]
    pub party: Option<String>,
    /// Reprocess partitions that already have a checkpoint
    #[serde(default)]
    pub force: bool,
    /// Plan only, persist and dispatch nothing
    #[serde(default)]
    pub dry_run: bool,
}

impl MigrationCommand {
    /// Validate against the known organizations and resolve the ones to
    /// migrate, sorted and deduplicated.
    pub fn resolve_organizations(&self, snapshot: &OrganizationSnapshot) -> Result<Vec<String>> {
        if self.from > self.to {
            return Err(SyncError::BadRequest(format!(
                "'from' ({}) is after 'to' ({})",
                self.from, self.to
            )));
        }

        if let Some(party) = &self.party {
            if party.trim().is_empty() {
                return Err(SyncError::BadRequest("'party' must not be blank".into()));
            }
        }

        let loaded_day = snapshot.loaded_at.date_naive();
        if self.to > loaded_day {
            return Err(SyncError::BadRequest(format!(
                "'to' ({}) is after the day organizations were loaded ({})",
                self.to, loaded_day
            )));
        }

        let requested: BTreeSet<String> = self
            .organizations
            .iter()
            .flatten()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if requested.is_empty() {
            return Ok(snapshot.orgs.iter().cloned().collect());
        }

        let invalid: Vec<&str> = requested
            .iter()
            .filter(|o| !snapshot.contains(o))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Err(SyncError::BadRequest(format!(
                "Unknown organizations: {}",
                invalid.join(", ")
            )));
        }

        Ok(requested.into_iter().collect())
    }

    pub fn party(&self) -> Option<String> {
        self.party.as_ref().map(|p| p.trim().to_string())
    }
}

/// Every (day, organization) pair of the inclusive range, day first
pub fn expand_partitions(from: NaiveDate, to: NaiveDate, organizations: &[String]) -> Vec<Partition> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .flat_map(|day| {
            organizations
                .iter()
                .map(move |org| Partition::new(day, org.clone()))
        })
        .collect()
}
