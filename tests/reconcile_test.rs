//! Reconciliation against in-memory collaborators
//!
//! Covers:
//! - Idempotent delivery of the same notification
//! - Soft delete, restore and purge with the revision threaded through
//! - Update followed by a saved-time correction on the returned revision
//! - Silent writes for migration notifications

mod common;

use common::{at, instance, notification, Harness};
use dialog_sync::clients::DialogWrite;
use dialog_sync::model::ids::dialog_id;
use dialog_sync::model::{
    ActivityType, InstanceEvent, InstanceEventType, PlatformUser, DIALOG_ID_KEY,
};
use dialog_sync::reconcile::{SkipReason, SyncOutcome};
use uuid::Uuid;

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_repeated_delivery_creates_once() {
    let h = Harness::new(&["acme"]);
    let inst = instance(1, "acme", at(2, 10, 0));
    h.origin.put_instance(inst.clone()).unwrap();
    let n = notification(&inst, false);

    let first = h.reconciler.sync(&n).await.unwrap();
    let second = h.reconciler.sync(&n).await.unwrap();

    assert_eq!(first, SyncOutcome::Created);
    assert_ne!(second, SyncOutcome::Created);
    assert_eq!(h.dialogs.count(DialogWrite::Create), 1);
    assert!(h.dialogs.count(DialogWrite::Update) <= 1);

    let id = dialog_id(n.instance_id, n.instance_created_at);
    let dialog = h.dialogs.dialog(id).unwrap();
    assert_eq!(dialog.service_resource, "urn:altinn:resource:app_acme_app");
}

#[tokio::test]
async fn test_marker_written_before_dialog() {
    let h = Harness::new(&["acme"]);
    let inst = instance(2, "acme", at(2, 11, 0));
    h.origin.put_instance(inst.clone()).unwrap();
    let n = notification(&inst, false);

    h.reconciler.sync(&n).await.unwrap();
    h.reconciler.sync(&n).await.unwrap();

    let stored = h.origin.instance(n.instance_id).unwrap();
    let expected = dialog_id(n.instance_id, n.instance_created_at).to_string();
    assert_eq!(stored.data_values.get(DIALOG_ID_KEY), Some(&expected));
    // Second delivery finds the marker already in place
    assert_eq!(h.origin.data_value_writes(), 1);
}

#[tokio::test]
async fn test_nothing_to_reconcile() {
    let h = Harness::new(&["acme"]);
    let inst = instance(3, "acme", at(2, 12, 0));
    let n = notification(&inst, false);

    let outcome = h.reconciler.sync(&n).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NothingToReconcile));
    assert!(h.dialogs.writes().is_empty());
}

// =============================================================================
// Revision chain
// =============================================================================

fn event(n: u128, created: chrono::DateTime<chrono::Utc>, event_type: InstanceEventType) -> InstanceEvent {
    InstanceEvent {
        id: Uuid::from_u128(n),
        created,
        event_type,
        user: PlatformUser {
            user_id: Some(1),
            national_identity_number: Some("01017012345".into()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_update_then_saved_time_correction() {
    let h = Harness::new(&["acme"]);
    let inst = instance(8, "acme", at(2, 10, 0));
    h.origin.put_instance(inst.clone()).unwrap();
    let guid = inst.guid().unwrap();
    let n = notification(&inst, false);
    let id = dialog_id(n.instance_id, n.instance_created_at);

    h.origin
        .set_events(guid, vec![event(101, at(2, 10, 0), InstanceEventType::Saved)]);
    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::Created);

    // Another save by the same user moves the collapsed activity, the
    // submit adds new entries
    h.origin.set_events(
        guid,
        vec![
            event(101, at(2, 10, 0), InstanceEventType::Saved),
            event(102, at(2, 10, 30), InstanceEventType::Saved),
            event(103, at(2, 11, 0), InstanceEventType::Submited),
        ],
    );
    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::Updated);

    let kinds: Vec<_> = h.dialogs.writes().iter().map(|(k, _, _)| *k).collect();
    assert_eq!(
        kinds,
        vec![DialogWrite::Create, DialogWrite::Update, DialogWrite::FormSavedTime]
    );

    let dialog = h.dialogs.dialog(id).unwrap();
    let saved: Vec<_> = dialog
        .activities
        .iter()
        .filter(|a| a.activity_type == ActivityType::FormSaved)
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].created_at, at(2, 10, 30));
    assert!(dialog
        .activities
        .iter()
        .any(|a| a.activity_type == ActivityType::FormSubmitted));

    // Converged
    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::Unchanged);
    assert_eq!(h.dialogs.writes().len(), 3);
}

// =============================================================================
// Deletion and restore
// =============================================================================

#[tokio::test]
async fn test_soft_delete_then_restore() {
    let h = Harness::new(&["acme"]);
    let mut inst = instance(4, "acme", at(2, 13, 0));
    h.origin.put_instance(inst.clone()).unwrap();
    let n = notification(&inst, false);
    let id = dialog_id(n.instance_id, n.instance_created_at);

    h.reconciler.sync(&n).await.unwrap();

    inst.status.is_soft_deleted = true;
    h.origin.put_instance(inst.clone()).unwrap();
    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::SoftDeleted);
    assert!(h.dialogs.dialog(id).unwrap().is_deleted());

    // Already deleted on both sides
    assert_eq!(
        h.reconciler.sync(&n).await.unwrap(),
        SyncOutcome::Skipped(SkipReason::AlreadyDeleted)
    );

    inst.status.is_soft_deleted = false;
    h.origin.put_instance(inst).unwrap();
    let outcome = h.reconciler.sync(&n).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Restored | SyncOutcome::Updated));
    assert!(!h.dialogs.dialog(id).unwrap().is_deleted());
    assert_eq!(h.dialogs.count(DialogWrite::Restore), 1);
}

#[tokio::test]
async fn test_soft_deleted_instance_without_dialog() {
    let h = Harness::new(&["acme"]);
    let mut inst = instance(5, "acme", at(2, 14, 0));
    inst.status.is_soft_deleted = true;
    h.origin.put_instance(inst.clone()).unwrap();
    let n = notification(&inst, false);

    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::CreatedDeleted);
    let id = dialog_id(n.instance_id, n.instance_created_at);
    assert!(h.dialogs.dialog(id).unwrap().is_deleted());
    assert_eq!(
        h.dialogs.writes().iter().map(|(k, _, _)| *k).collect::<Vec<_>>(),
        vec![DialogWrite::Create, DialogWrite::Delete]
    );
}

#[tokio::test]
async fn test_hard_deleted_instance_purges() {
    let h = Harness::new(&["acme"]);
    let mut inst = instance(6, "acme", at(2, 15, 0));
    h.origin.put_instance(inst.clone()).unwrap();
    let n = notification(&inst, false);
    let id = dialog_id(n.instance_id, n.instance_created_at);

    h.reconciler.sync(&n).await.unwrap();

    inst.status.is_hard_deleted = true;
    h.origin.put_instance(inst).unwrap();
    assert_eq!(h.reconciler.sync(&n).await.unwrap(), SyncOutcome::Purged);
    assert!(h.dialogs.dialog(id).is_none());

    // Instance gone as well: nothing left to do
    h.origin.remove_instance(Uuid::from_u128(6));
    assert_eq!(
        h.reconciler.sync(&n).await.unwrap(),
        SyncOutcome::Skipped(SkipReason::NothingToReconcile)
    );
}

// =============================================================================
// Migration writes
// =============================================================================

#[tokio::test]
async fn test_migration_writes_are_silent() {
    let h = Harness::new(&["acme"]);
    let mut inst = instance(7, "acme", at(2, 16, 0));
    h.origin.put_instance(inst.clone()).unwrap();

    h.reconciler.sync(&notification(&inst, true)).await.unwrap();
    inst.status.is_soft_deleted = true;
    h.origin.put_instance(inst.clone()).unwrap();
    h.reconciler.sync(&notification(&inst, true)).await.unwrap();

    let writes = h.dialogs.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|(_, _, silent)| *silent));

    // Live notifications are not silent
    inst.status.is_soft_deleted = false;
    h.origin.put_instance(inst.clone()).unwrap();
    h.reconciler.sync(&notification(&inst, false)).await.unwrap();
    assert!(h.dialogs.writes().iter().skip(2).all(|(_, _, silent)| !*silent));
}

#[tokio::test]
async fn test_missing_application_is_fatal() {
    let h = Harness::new(&[]);
    let inst = instance(8, "acme", at(2, 17, 0));
    h.origin.put_instance(inst.clone()).unwrap();

    let err = h.reconciler.sync(&notification(&inst, false)).await.unwrap_err();
    assert!(matches!(err, dialog_sync::SyncError::Unreachable(_)));
    assert!(h.dialogs.writes().is_empty());
}
