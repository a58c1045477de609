//! Fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use dialog_sync::clients::{sample_application, InMemoryDialogService, InMemoryOriginStore};
use dialog_sync::model::{
    ChangeRecord, Instance, InstanceOwner, ProcessElement, ProcessState, SyncNotification,
};
use dialog_sync::reconcile::{DialogBuilder, DialogReconciler};

pub const PARTY: &str = "50001";

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

/// A live instance in a data task, created on March 1st
pub fn instance(n: u128, org: &str, last_changed: DateTime<Utc>) -> Instance {
    Instance {
        id: format!("{}/{}", PARTY, Uuid::from_u128(n)),
        instance_owner: InstanceOwner {
            party_id: PARTY.to_string(),
            person_number: Some("01017012345".to_string()),
            organisation_number: None,
        },
        app_id: format!("{}/app", org),
        org: org.to_string(),
        created: at(1, 8, 0),
        last_changed,
        process: Some(ProcessState {
            current_task: Some(ProcessElement {
                element_id: "Task_1".to_string(),
                name: Some("Fill in".to_string()),
                task_type: Some("data".to_string()),
            }),
            ended: None,
        }),
        ..Default::default()
    }
}

pub fn notification(instance: &Instance, is_migration: bool) -> SyncNotification {
    ChangeRecord::from_instance(instance)
        .unwrap()
        .into_notification(is_migration)
}

/// Reconciler wired to in-memory collaborators
pub struct Harness {
    pub origin: Arc<InMemoryOriginStore>,
    pub dialogs: Arc<InMemoryDialogService>,
    pub reconciler: DialogReconciler,
}

impl Harness {
    pub fn new(orgs: &[&str]) -> Self {
        let origin = Arc::new(InMemoryOriginStore::new());
        for org in orgs {
            origin.add_application(sample_application(org, "app"));
        }
        let dialogs = Arc::new(InMemoryDialogService::new());
        let reconciler = DialogReconciler::new(
            origin.clone(),
            dialogs.clone(),
            DialogBuilder::new("https://{org}.apps.example.test"),
        );
        Self {
            origin,
            dialogs,
            reconciler,
        }
    }
}
