//! Merge of a freshly built dialog into the stored one

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use super::gui_actions::pack;
use crate::model::{ActivityType, Dialog};

/// Append the entries of `incoming` whose id is not in `existing`
fn append_new<T: Clone>(existing: &[T], incoming: &[T], id: impl Fn(&T) -> Uuid) -> Vec<T> {
    let known: HashSet<Uuid> = existing.iter().map(&id).collect();
    existing
        .iter()
        .chain(incoming.iter().filter(|item| !known.contains(&id(*item))))
        .cloned()
        .collect()
}

/// The dialog to write back.
///
/// Content and status come from `computed`. Attachments, transmissions and
/// activities only grow. Actions not in `owned_action_ids` are kept and the
/// computed actions are packed around them.
pub fn merge(existing: &Dialog, computed: &Dialog, owned_action_ids: &HashSet<Uuid>) -> Dialog {
    let external = existing
        .gui_actions
        .iter()
        .filter(|a| !owned_action_ids.contains(&a.id))
        .cloned()
        .collect();

    Dialog {
        id: existing.id,
        service_resource: computed.service_resource.clone(),
        party: computed.party.clone(),
        status: computed.status,
        extended_status: computed.extended_status.clone(),
        due_at: computed.due_at,
        visible_from: computed.visible_from,
        content: computed.content.clone(),
        attachments: append_new(&existing.attachments, &computed.attachments, |a| a.id),
        transmissions: append_new(&existing.transmissions, &computed.transmissions, |t| t.id),
        activities: append_new(&existing.activities, &computed.activities, |a| a.id),
        gui_actions: pack(external, computed.gui_actions.clone()),
        deleted_at: existing.deleted_at,
        revision: existing.revision.clone(),
    }
}

/// Stored `FormSaved` activities whose time moved since they were written
pub fn form_saved_corrections(existing: &Dialog, computed: &Dialog) -> Vec<(Uuid, DateTime<Utc>)> {
    computed
        .activities
        .iter()
        .filter(|a| a.activity_type == ActivityType::FormSaved)
        .filter_map(|a| {
            existing
                .activities
                .iter()
                .find(|e| e.id == a.id && e.created_at != a.created_at)
                .map(|_| (a.id, a.created_at))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, ActorRef, DialogStatus, GuiAction, GuiActionPriority};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap()
    }

    fn activity(n: u128, kind: ActivityType, minute: u32) -> Activity {
        Activity {
            id: Uuid::from_u128(n),
            created_at: at(minute),
            activity_type: kind,
            performed_by: ActorRef::default(),
            description: vec![],
        }
    }

    fn action(n: u128, priority: GuiActionPriority) -> GuiAction {
        GuiAction {
            id: Uuid::from_u128(n),
            action: format!("a{n}"),
            url: format!("https://x/{n}"),
            http_method: "GET".into(),
            priority,
            is_delete_dialog_action: false,
            title: vec![],
        }
    }

    #[test]
    fn test_collections_append_only() {
        let existing = Dialog {
            status: DialogStatus::InProgress,
            activities: vec![activity(1, ActivityType::DialogCreated, 0)],
            revision: Some("r1".into()),
            ..Default::default()
        };
        let computed = Dialog {
            status: DialogStatus::Completed,
            activities: vec![
                activity(1, ActivityType::DialogCreated, 0),
                activity(2, ActivityType::FormSubmitted, 5),
            ],
            ..Default::default()
        };

        let merged = merge(&existing, &computed, &HashSet::new());
        assert_eq!(merged.status, DialogStatus::Completed);
        assert_eq!(merged.activities.len(), 2);
        assert_eq!(merged.revision.as_deref(), Some("r1"));
    }

    #[test]
    fn test_converged_merge_is_identity() {
        let computed = Dialog {
            activities: vec![activity(1, ActivityType::DialogCreated, 0)],
            gui_actions: vec![action(10, GuiActionPriority::Primary)],
            ..Default::default()
        };
        let mut existing = computed.clone();
        existing.revision = Some("r1".into());

        let owned = HashSet::from([Uuid::from_u128(10)]);
        assert_eq!(merge(&existing, &computed, &owned), existing);
    }

    #[test]
    fn test_external_actions_preserved() {
        let existing = Dialog {
            gui_actions: vec![
                action(1, GuiActionPriority::Primary),
                action(10, GuiActionPriority::Primary),
            ],
            ..Default::default()
        };
        let computed = Dialog {
            gui_actions: vec![action(10, GuiActionPriority::Primary)],
            ..Default::default()
        };
        let owned = HashSet::from([Uuid::from_u128(10)]);

        let merged = merge(&existing, &computed, &owned);
        assert_eq!(merged.gui_actions[0], action(1, GuiActionPriority::Primary));
        // The owned primary moves down behind the external one
        assert_eq!(merged.gui_actions[1].id, Uuid::from_u128(10));
        assert_eq!(merged.gui_actions[1].priority, GuiActionPriority::Secondary);
    }

    #[test]
    fn test_form_saved_corrections() {
        let existing = Dialog {
            activities: vec![
                activity(1, ActivityType::FormSaved, 1),
                activity(2, ActivityType::DialogCreated, 0),
            ],
            ..Default::default()
        };
        let computed = Dialog {
            activities: vec![
                activity(1, ActivityType::FormSaved, 4),
                activity(2, ActivityType::DialogCreated, 0),
                activity(3, ActivityType::FormSaved, 6),
            ],
            ..Default::default()
        };
        assert_eq!(
            form_saved_corrections(&existing, &computed),
            vec![(Uuid::from_u128(1), at(4))]
        );
    }
}
