//! Builds the dialog an instance calls for
//!
//! The result depends only on its inputs, so building twice from the same
//! instance, application and events yields equal dialogs.

use uuid::Uuid;

use super::activities::{activities_from_events, transmissions_from_events};
use super::gui_actions::{compute_actions, pack};
use crate::model::ids::child_id;
use crate::model::{
    Application, Attachment, AttachmentUrl, ContentValue, DataElement, Dialog, DialogContent,
    DialogStatus, Instance, InstanceEvent, Localization, TransmissionType,
};
use crate::types::{Result, SyncError};

/// Status of the dialog for the instance's process state
pub fn dialog_status(instance: &Instance) -> DialogStatus {
    let Some(process) = &instance.process else {
        return DialogStatus::NotApplicable;
    };
    if instance.status.is_archived || process.ended.is_some() {
        return DialogStatus::Completed;
    }
    let Some(task) = &process.current_task else {
        return DialogStatus::NotApplicable;
    };
    match task.task_type.as_deref() {
        Some("signing") | Some("confirmation") | Some("payment") => DialogStatus::RequiresAttention,
        Some("feedback") => DialogStatus::Awaiting,
        _ => DialogStatus::InProgress,
    }
}

#[derive(Debug, Clone)]
pub struct DialogBuilder {
    /// `{org}` is replaced with the instance's organization
    app_base_url: String,
}

impl DialogBuilder {
    pub fn new(app_base_url: impl Into<String>) -> Self {
        Self {
            app_base_url: app_base_url.into(),
        }
    }

    /// Root URL of the app that owns `instance`
    pub fn app_url(&self, instance: &Instance) -> String {
        format!(
            "{}/{}/{}",
            self.app_base_url.replace("{org}", &instance.org).trim_end_matches('/'),
            instance.org,
            instance.app_name()
        )
    }

    pub fn build(
        &self,
        dialog_id: Uuid,
        instance: &Instance,
        application: &Application,
        events: &[InstanceEvent],
    ) -> Result<Dialog> {
        let app_url = self.app_url(instance);
        let attachments: Vec<Attachment> = instance
            .data
            .iter()
            .filter(|d| is_app_generated(application, d))
            .map(|d| attachment(dialog_id, instance, &app_url, d))
            .collect();

        let transmissions = transmissions_from_events(dialog_id, events, |event, kind| {
            instance
                .data
                .iter()
                .filter(|d| d.created.map_or(true, |c| c <= event.created))
                .filter(|d| match kind {
                    TransmissionType::Submission => !is_app_generated(application, d),
                    _ => is_app_generated(application, d),
                })
                .map(|d| attachment(dialog_id, instance, &app_url, d))
                .collect()
        });

        let substatus = instance.status.substatus.as_ref();
        Ok(Dialog {
            id: dialog_id,
            service_resource: format!(
                "urn:altinn:resource:app_{}_{}",
                instance.org,
                instance.app_name()
            ),
            party: party_urn(instance)?,
            status: dialog_status(instance),
            extended_status: substatus.and_then(|s| s.label.clone()),
            due_at: instance.due_before,
            visible_from: instance.visible_after,
            content: DialogContent {
                title: ContentValue::plain(title(application, instance)),
                summary: substatus
                    .and_then(|s| s.description.clone())
                    .map(|d| ContentValue::plain(vec![Localization::new(d, "en")])),
                extended_status: substatus
                    .and_then(|s| s.label.clone())
                    .map(|l| ContentValue::plain(vec![Localization::new(l, "en")])),
            },
            attachments,
            transmissions,
            activities: activities_from_events(dialog_id, events),
            gui_actions: pack(
                Vec::new(),
                compute_actions(dialog_id, instance, application, &app_url),
            ),
            deleted_at: None,
            revision: None,
        })
    }
}

fn is_app_generated(application: &Application, element: &DataElement) -> bool {
    application
        .data_types
        .iter()
        .any(|t| t.id == element.data_type && t.app_logic)
}

fn attachment(dialog_id: Uuid, instance: &Instance, app_url: &str, element: &DataElement) -> Attachment {
    Attachment {
        id: child_id(
            dialog_id,
            "attachment",
            &element.id,
            element.created.unwrap_or(instance.created),
        ),
        display_name: vec![Localization::new(
            element.filename.clone().unwrap_or_else(|| element.data_type.clone()),
            "en",
        )],
        urls: vec![AttachmentUrl {
            url: format!("{}/instances/{}/data/{}", app_url, instance.id, element.id),
            media_type: element.content_type.clone(),
            consumer_type: "Gui".to_string(),
        }],
    }
}

fn title(application: &Application, instance: &Instance) -> Vec<Localization> {
    if application.title.is_empty() {
        return vec![Localization::new(instance.app_name(), "en")];
    }
    application
        .title
        .iter()
        .map(|(lang, text)| Localization::new(text.clone(), lang.clone()))
        .collect()
}

fn party_urn(instance: &Instance) -> Result<String> {
    let owner = &instance.instance_owner;
    if let Some(person) = owner.person_number.as_deref().filter(|p| !p.is_empty()) {
        return Ok(format!("urn:altinn:person:identifier-no:{}", person));
    }
    if let Some(org) = owner.organisation_number.as_deref().filter(|o| !o.is_empty()) {
        return Ok(format!("urn:altinn:organization:identifier-no:{}", org));
    }
    Err(SyncError::BadRequest(format!(
        "Instance {} has an owner without person or organisation number",
        instance.id
    )))
}
