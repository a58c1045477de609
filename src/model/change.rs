//! Change records and the sync notifications derived from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::Instance;
use crate::types::Result;

/// One observed mutation in the origin store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub app_id: String,
    pub instance_id: Uuid,
    pub party_id: String,
    pub created_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn from_instance(instance: &Instance) -> Result<Self> {
        Ok(Self {
            app_id: instance.app_id.clone(),
            instance_id: instance.guid()?,
            party_id: instance.instance_owner.party_id.clone(),
            created_at: instance.created,
            last_changed_at: instance.last_changed,
        })
    }

    pub fn into_notification(self, is_migration: bool) -> SyncNotification {
        SyncNotification {
            app_id: self.app_id,
            party_id: self.party_id,
            instance_id: self.instance_id,
            instance_created_at: self.created_at,
            is_migration,
        }
    }
}

/// Unit of work for the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotification {
    pub app_id: String,
    pub party_id: String,
    pub instance_id: Uuid,
    pub instance_created_at: DateTime<Utc>,
    /// Backfilled change: writes are silent on the dialog side
    #[serde(default)]
    pub is_migration: bool,
}

impl SyncNotification {
    /// Organization part of the app id
    pub fn org(&self) -> &str {
        self.app_id
            .split_once('/')
            .map(|(org, _)| org)
            .unwrap_or(&self.app_id)
    }
}
