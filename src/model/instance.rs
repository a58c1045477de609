//! Origin store records
//!
//! Instances, applications and instance events as returned by the
//! case-management store. Only the fields reconciliation reads are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::types::{Result, SyncError};

/// Data value key holding the dialog id once the instance has been synced
pub const DIALOG_ID_KEY: &str = "dialog.id";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOwner {
    pub party_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessElement {
    pub element_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Task type: data, signing, confirmation, feedback, payment
    #[serde(default, alias = "altinnTaskType")]
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    #[serde(default)]
    pub current_task: Option<ProcessElement>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substatus {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_soft_deleted: bool,
    #[serde(default)]
    pub is_hard_deleted: bool,
    #[serde(default)]
    pub substatus: Option<Substatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataElement {
    pub id: String,
    pub data_type: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// An origin-store case record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// `{partyId}/{guid}`
    pub id: String,
    pub instance_owner: InstanceOwner,
    /// `{org}/{app}`
    pub app_id: String,
    pub org: String,
    pub created: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
    #[serde(default)]
    pub due_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visible_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub process: Option<ProcessState>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub data: Vec<DataElement>,
    #[serde(default)]
    pub data_values: HashMap<String, String>,
}

impl Instance {
    /// The instance guid, the part of `id` after the party
    pub fn guid(&self) -> Result<Uuid> {
        let raw = self.id.rsplit('/').next().unwrap_or(&self.id);
        Uuid::parse_str(raw)
            .map_err(|e| SyncError::BadRequest(format!("Invalid instance id '{}': {}", self.id, e)))
    }

    /// App name without the org prefix
    pub fn app_name(&self) -> &str {
        self.app_id
            .split_once('/')
            .map(|(_, app)| app)
            .unwrap_or(&self.app_id)
    }

    pub fn dialog_marker(&self) -> Option<&str> {
        self.data_values.get(DIALOG_ID_KEY).map(String::as_str)
    }

    pub fn is_hard_deleted(&self) -> bool {
        self.status.is_hard_deleted
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.status.is_soft_deleted
    }
}

/// Application metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// `{org}/{app}`
    pub id: String,
    pub org: String,
    /// Language code to title
    #[serde(default)]
    pub title: BTreeMap<String, String>,
    #[serde(default)]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub prevent_deletion: bool,
    #[serde(default)]
    pub allow_copy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataType {
    pub id: String,
    /// Task the data type is filled in, if any
    #[serde(default)]
    pub task_id: Option<String>,
    /// Set for data types generated by the app (receipts, PDFs)
    #[serde(default)]
    pub app_logic: bool,
}

/// Listing entry of `GET /applications`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRef {
    pub id: String,
    pub org: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceEventType {
    Created,
    Saved,
    Submited,
    Deleted,
    Undeleted,
    Signed,
    ConfirmedComplete,
    MessageArchived,
    MessageRead,
    #[serde(other)]
    Other,
}

impl InstanceEventType {
    /// Event types reconciliation asks the origin store for
    pub const RELEVANT: [InstanceEventType; 9] = [
        Self::Created,
        Self::Saved,
        Self::Submited,
        Self::Deleted,
        Self::Undeleted,
        Self::Signed,
        Self::ConfirmedComplete,
        Self::MessageArchived,
        Self::MessageRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Saved => "Saved",
            Self::Submited => "Submited",
            Self::Deleted => "Deleted",
            Self::Undeleted => "Undeleted",
            Self::Signed => "Signed",
            Self::ConfirmedComplete => "ConfirmedComplete",
            Self::MessageArchived => "MessageArchived",
            Self::MessageRead => "MessageRead",
            Self::Other => "Other",
        }
    }
}

/// The raw "performed by" fields of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformUser {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub end_user_system_id: Option<String>,
    #[serde(default)]
    pub national_identity_number: Option<String>,
    #[serde(default)]
    pub system_user_id: Option<Uuid>,
    #[serde(default)]
    pub system_user_owner_org_no: Option<String>,
    #[serde(default)]
    pub system_user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceEvent {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub event_type: InstanceEventType,
    #[serde(default)]
    pub user: PlatformUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_deserialize() {
        let json = serde_json::json!({
            "id": "50001/a3e0c1a2-5b6f-4d8e-9f01-23456789abcd",
            "instanceOwner": { "partyId": "50001", "personNumber": "01017012345" },
            "appId": "acme/tax-form",
            "org": "acme",
            "created": "2024-01-01T10:00:00Z",
            "lastChanged": "2024-01-01T11:00:00Z",
            "status": { "isArchived": true },
            "dataValues": { "dialog.id": "abc" }
        });
        let instance: Instance = serde_json::from_value(json).unwrap();

        assert_eq!(instance.app_name(), "tax-form");
        assert!(instance.status.is_archived);
        assert!(!instance.is_soft_deleted());
        assert_eq!(instance.dialog_marker(), Some("abc"));
        assert_eq!(
            instance.guid().unwrap().to_string(),
            "a3e0c1a2-5b6f-4d8e-9f01-23456789abcd"
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let json = serde_json::json!({
            "id": "0f9e8d7c-6b5a-4321-8765-43210fedcba9",
            "created": "2024-01-01T10:00:00Z",
            "eventType": "ProcessStartEvent",
        });
        let event: InstanceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.event_type, InstanceEventType::Other);
    }
}
