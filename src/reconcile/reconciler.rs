//! Brings one dialog in line with its instance

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::builder::DialogBuilder;
use super::decision::{decide, SkipReason, SyncAction};
use super::gui_actions::owned_ids;
use super::merge::{form_saved_corrections, merge};
use crate::clients::{DialogService, OriginStore, WriteOptions};
use crate::model::ids::dialog_id;
use crate::model::{Dialog, Instance, InstanceEventType, SyncNotification, DIALOG_ID_KEY};
use crate::pipeline::ItemHandler;
use crate::types::{ErrorClass, Result, SyncError};

/// What a reconciliation ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Purged,
    SoftDeleted,
    Created,
    /// Created, then soft deleted to match a soft-deleted instance
    CreatedDeleted,
    Restored,
    Updated,
    Unchanged,
}

pub struct DialogReconciler {
    origin: Arc<dyn OriginStore>,
    dialogs: Arc<dyn DialogService>,
    builder: DialogBuilder,
}

impl DialogReconciler {
    pub fn new(
        origin: Arc<dyn OriginStore>,
        dialogs: Arc<dyn DialogService>,
        builder: DialogBuilder,
    ) -> Self {
        Self {
            origin,
            dialogs,
            builder,
        }
    }

    pub async fn sync(&self, notification: &SyncNotification) -> Result<SyncOutcome> {
        let dialog_id = dialog_id(notification.instance_id, notification.instance_created_at);
        let result = self.reconcile(notification, dialog_id).await;

        match &result {
            Ok(outcome) => debug!(
                org = notification.org(),
                instance_id = %notification.instance_id,
                dialog_id = %dialog_id,
                outcome = ?outcome,
                "Reconciled"
            ),
            Err(e) if matches!(e.class(), ErrorClass::Permanent | ErrorClass::Unreachable) => error!(
                org = notification.org(),
                app_id = %notification.app_id,
                party_id = %notification.party_id,
                instance_id = %notification.instance_id,
                dialog_id = %dialog_id,
                is_migration = notification.is_migration,
                error = %e,
                "Reconciliation rejected"
            ),
            Err(e) => warn!(
                org = notification.org(),
                instance_id = %notification.instance_id,
                dialog_id = %dialog_id,
                error = %e,
                "Reconciliation failed"
            ),
        }
        result
    }

    async fn reconcile(&self, n: &SyncNotification, dialog_id: Uuid) -> Result<SyncOutcome> {
        let (instance, dialog) = tokio::try_join!(
            self.origin.get_instance(&n.party_id, n.instance_id),
            self.dialogs.get(dialog_id),
        )?;

        // Mark the instance before touching the dialog
        if let Some(live) = instance.as_ref().filter(|i| !i.is_hard_deleted()) {
            self.ensure_marker(live, dialog_id).await?;
        }

        let opts = WriteOptions::silent(n.is_migration);
        match decide(instance.as_ref(), dialog.as_ref()) {
            SyncAction::Skip(reason) => {
                if reason == SkipReason::NothingToReconcile {
                    warn!(
                        org = n.org(),
                        instance_id = %n.instance_id,
                        dialog_id = %dialog_id,
                        "No instance and no dialog, nothing to reconcile"
                    );
                }
                Ok(SyncOutcome::Skipped(reason))
            }
            SyncAction::Purge => {
                let dialog = present(dialog, "purge")?;
                self.dialogs.purge(dialog_id, revision(&dialog)?, opts).await?;
                info!(org = n.org(), instance_id = %n.instance_id, dialog_id = %dialog_id, "Dialog purged");
                Ok(SyncOutcome::Purged)
            }
            SyncAction::SoftDelete => {
                let dialog = present(dialog, "soft delete")?;
                self.dialogs.delete(dialog_id, revision(&dialog)?, opts).await?;
                info!(org = n.org(), instance_id = %n.instance_id, dialog_id = %dialog_id, "Dialog deleted");
                Ok(SyncOutcome::SoftDeleted)
            }
            SyncAction::Upsert { restore } => {
                let instance = present(instance, "upsert")?;
                self.upsert(n, dialog_id, &instance, dialog, restore, opts).await
            }
        }
    }

    async fn ensure_marker(&self, instance: &Instance, dialog_id: Uuid) -> Result<()> {
        let id = dialog_id.to_string();
        if instance.dialog_marker() == Some(id.as_str()) {
            return Ok(());
        }
        let values = HashMap::from([(DIALOG_ID_KEY.to_string(), id)]);
        self.origin
            .update_data_values(&instance.instance_owner.party_id, instance.guid()?, &values)
            .await
    }

    async fn upsert(
        &self,
        n: &SyncNotification,
        dialog_id: Uuid,
        instance: &Instance,
        existing: Option<Dialog>,
        restore: bool,
        opts: WriteOptions,
    ) -> Result<SyncOutcome> {
        let application = self
            .origin
            .get_application(&instance.app_id)
            .await?
            .ok_or_else(|| {
                SyncError::Unreachable(format!(
                    "Application {} missing for instance {}",
                    instance.app_id, instance.id
                ))
            })?;
        let events = self
            .origin
            .get_events(&n.party_id, n.instance_id, &InstanceEventType::RELEVANT)
            .await?;
        let computed = self.builder.build(dialog_id, instance, &application, &events)?;

        let Some(mut existing) = existing else {
            let revision = self.dialogs.create(&computed, opts).await?;
            info!(org = n.org(), instance_id = %n.instance_id, dialog_id = %dialog_id, "Dialog created");

            // A soft-deleted instance gets a dialog that is deleted as well
            if instance.is_soft_deleted() {
                self.dialogs.delete(dialog_id, &revision, opts).await?;
                return Ok(SyncOutcome::CreatedDeleted);
            }
            return Ok(SyncOutcome::Created);
        };

        let mut revision = revision(&existing)?.to_string();
        if restore {
            revision = self.dialogs.restore(dialog_id, &revision, opts).await?;
            existing.deleted_at = None;
            existing.revision = Some(revision.clone());
            info!(org = n.org(), instance_id = %n.instance_id, dialog_id = %dialog_id, "Dialog restored");
        }

        let corrections = form_saved_corrections(&existing, &computed);
        let merged = merge(
            &existing,
            &computed,
            &owned_ids(dialog_id, instance.created),
        );

        let mut changed = false;
        if merged != existing {
            revision = self.dialogs.update(&merged, &revision, opts).await?;
            changed = true;
        }
        // Each write returns the revision the next one must present
        for (activity_id, created_at) in corrections {
            revision = self
                .dialogs
                .update_form_saved_time(dialog_id, activity_id, created_at, &revision, opts)
                .await?;
            changed = true;
        }

        Ok(match (changed, restore) {
            (true, _) => {
                info!(org = n.org(), instance_id = %n.instance_id, dialog_id = %dialog_id, "Dialog updated");
                SyncOutcome::Updated
            }
            (false, true) => SyncOutcome::Restored,
            (false, false) => SyncOutcome::Unchanged,
        })
    }
}

fn present<T>(value: Option<T>, step: &str) -> Result<T> {
    value.ok_or_else(|| SyncError::Unreachable(format!("Nothing to {}", step)))
}

fn revision(dialog: &Dialog) -> Result<&str> {
    dialog
        .revision
        .as_deref()
        .ok_or_else(|| SyncError::Unreachable(format!("Dialog {} read without a revision", dialog.id)))
}

#[async_trait]
impl ItemHandler<SyncNotification> for DialogReconciler {
    async fn handle(&self, item: &SyncNotification) -> Result<()> {
        self.sync(item).await.map(|_| ())
    }
}
