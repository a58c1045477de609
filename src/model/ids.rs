//! Deterministic identifiers
//!
//! Dialog ids use the UUIDv7 layout: the instance creation time in
//! milliseconds, followed by bytes of a SHA-256 hash of the source identity.
//! The same instance always maps to the same dialog, and ids still sort by
//! creation time.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::{Builder, Uuid};

/// Build a v7-layout UUID from a timestamp and an arbitrary seed
pub fn deterministic_v7(created: DateTime<Utc>, seed: &[u8]) -> Uuid {
    let digest = Sha256::digest(seed);
    let mut tail = [0u8; 10];
    tail.copy_from_slice(&digest[..10]);

    let millis = created.timestamp_millis().max(0) as u64;
    Builder::from_unix_timestamp_millis(millis, &tail).into_uuid()
}

/// Dialog id for an instance
pub fn dialog_id(instance_guid: Uuid, instance_created: DateTime<Utc>) -> Uuid {
    deterministic_v7(instance_created, instance_guid.as_bytes())
}

/// Id of a sub-resource owned by a dialog (activity, transmission, attachment, action)
pub fn child_id(dialog_id: Uuid, kind: &str, discriminator: &str, at: DateTime<Utc>) -> Uuid {
    let mut seed = Vec::with_capacity(16 + kind.len() + discriminator.len() + 1);
    seed.extend_from_slice(dialog_id.as_bytes());
    seed.extend_from_slice(kind.as_bytes());
    seed.push(b':');
    seed.extend_from_slice(discriminator.as_bytes());
    deterministic_v7(at, &seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dialog_id_is_stable() {
        let guid = Uuid::parse_str("a3e0c1a2-5b6f-4d8e-9f01-23456789abcd").unwrap();
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();

        let a = dialog_id(guid, created);
        let b = dialog_id(guid, created);
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 7);

        let (secs, _) = a.get_timestamp().unwrap().to_unix();
        assert_eq!(secs as i64, created.timestamp());
    }

    #[test]
    fn test_ids_differ_by_input() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let a = dialog_id(Uuid::from_u128(1), created);
        let b = dialog_id(Uuid::from_u128(2), created);
        assert_ne!(a, b);

        assert_ne!(
            child_id(a, "action", "goto", created),
            child_id(a, "action", "delete", created)
        );
    }
}
