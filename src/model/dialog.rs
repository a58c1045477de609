//! The dialog aggregate as exchanged with the dialog service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogStatus {
    #[default]
    NotApplicable,
    InProgress,
    Draft,
    Awaiting,
    RequiresAttention,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Localization {
    pub value: String,
    pub language_code: String,
}

impl Localization {
    pub fn new(value: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language_code: language_code.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentValue {
    pub value: Vec<Localization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl ContentValue {
    pub fn plain(value: Vec<Localization>) -> Self {
        Self {
            value,
            media_type: Some("text/plain".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogContent {
    pub title: ContentValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ContentValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_status: Option<ContentValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    #[default]
    PartyRepresentative,
    ServiceOwner,
}

/// Who performed an activity or sent a transmission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRef {
    pub actor_type: ActorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub consumer_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    #[serde(default)]
    pub display_name: Vec<Localization>,
    #[serde(default)]
    pub urls: Vec<AttachmentUrl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionType {
    Information,
    Submission,
    Acceptance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transmission {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub transmission_type: TransmissionType,
    pub sender: ActorRef,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    Information,
    DialogCreated,
    DialogClosed,
    DialogOpened,
    DialogDeleted,
    DialogRestored,
    FormSaved,
    FormSubmitted,
    SignatureProvided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub performed_by: ActorRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<Localization>,
}

/// Priority tier of a GUI action. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GuiActionPriority {
    Primary,
    Secondary,
    Tertiary,
}

impl GuiActionPriority {
    pub const ALL: [GuiActionPriority; 3] = [Self::Primary, Self::Secondary, Self::Tertiary];

    /// Maximum number of actions the dialog service accepts in this tier
    pub fn capacity(&self) -> usize {
        match self {
            Self::Primary => 1,
            Self::Secondary => 1,
            Self::Tertiary => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuiAction {
    pub id: Uuid,
    pub action: String,
    pub url: String,
    pub http_method: String,
    pub priority: GuiActionPriority,
    #[serde(default)]
    pub is_delete_dialog_action: bool,
    #[serde(default)]
    pub title: Vec<Localization>,
}

impl GuiAction {
    /// Two actions with the same identity do the same thing for the user
    pub fn same_identity(&self, other: &GuiAction) -> bool {
        self.action == other.action
            && self.http_method.eq_ignore_ascii_case(&other.http_method)
            && self.url == other.url
    }
}

/// Dialog aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialog {
    pub id: Uuid,
    pub service_resource: String,
    pub party: String,
    #[serde(default)]
    pub status: DialogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: DialogContent,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub transmissions: Vec<Transmission>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub gui_actions: Vec<GuiAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, carried in the `ETag` header
    #[serde(skip)]
    pub revision: Option<String>,
}

impl Dialog {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_and_capacity() {
        assert!(GuiActionPriority::Primary < GuiActionPriority::Secondary);
        assert!(GuiActionPriority::Secondary < GuiActionPriority::Tertiary);
        let total: usize = GuiActionPriority::ALL.iter().map(|p| p.capacity()).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_revision_not_serialized() {
        let dialog = Dialog {
            revision: Some("\"etag-1\"".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&dialog).unwrap();
        assert!(json.get("revision").is_none());
        assert!(json.get("guiActions").is_some());
    }

    #[test]
    fn test_action_identity_ignores_method_case() {
        let a = GuiAction {
            id: Uuid::from_u128(1),
            action: "read".into(),
            url: "https://x/y".into(),
            http_method: "GET".into(),
            priority: GuiActionPriority::Primary,
            is_delete_dialog_action: false,
            title: vec![],
        };
        let b = GuiAction {
            id: Uuid::from_u128(2),
            http_method: "get".into(),
            priority: GuiActionPriority::Tertiary,
            ..a.clone()
        };
        assert!(a.same_identity(&b));
    }
}
