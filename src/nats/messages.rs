//! JetStream subjects and message envelopes
//!
//! Everything travels as JSON on one stream, `DIALOG_SYNC`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::model::SyncNotification;
use crate::types::{ErrorClass, Result, SyncError};

pub const STREAM_NAME: &str = "DIALOG_SYNC";
pub const SUBJECT_PREFIX: &str = "dialogsync";

/// One message per migration partition
pub const PARTITION_SUBJECT: &str = "dialogsync.partition";

/// Migration notifications awaiting reconciliation
pub const NOTIFICATION_SUBJECT: &str = "dialogsync.notification";

/// Notifications the retry policy gave up on
pub const PARKED_SUBJECT: &str = "dialogsync.parked";

pub const PARTITION_CONSUMER: &str = "dialogsync_partitions";
pub const NOTIFICATION_CONSUMER: &str = "dialogsync_notifications";

/// A notification set aside for manual inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkedNotification {
    pub notification: SyncNotification,
    pub error: String,
    pub error_class: String,
    pub parked_at: DateTime<Utc>,
    /// Node that gave up on it
    pub node_id: String,
}

impl ParkedNotification {
    pub fn new(notification: SyncNotification, error: &SyncError, node_id: &str) -> Self {
        let error_class = match error.class() {
            ErrorClass::Transient => "transient",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Unreachable => "unreachable",
        };
        Self {
            notification,
            error: error.to_string(),
            error_class: error_class.to_string(),
            parked_at: Utc::now(),
            node_id: node_id.to_string(),
        }
    }
}

/// Serialize to JSON bytes
pub fn encode<T: Serialize>(message: &T) -> Result<bytes::Bytes> {
    Ok(serde_json::to_vec(message)?.into())
}

/// Deserialize from JSON bytes
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(data)?)
}
