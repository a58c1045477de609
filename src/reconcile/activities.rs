//! Activities and transmissions derived from the instance event history

use uuid::Uuid;

use crate::model::ids::child_id;
use crate::model::{
    Activity, ActivityType, Actor, ActorRef, ActorType, Attachment, InstanceEvent,
    InstanceEventType, Transmission, TransmissionType,
};

fn activity_type(event_type: InstanceEventType) -> Option<ActivityType> {
    match event_type {
        InstanceEventType::Created => Some(ActivityType::DialogCreated),
        InstanceEventType::Saved => Some(ActivityType::FormSaved),
        InstanceEventType::Submited => Some(ActivityType::FormSubmitted),
        InstanceEventType::Deleted => Some(ActivityType::DialogDeleted),
        InstanceEventType::Undeleted => Some(ActivityType::DialogRestored),
        InstanceEventType::Signed => Some(ActivityType::SignatureProvided),
        InstanceEventType::MessageArchived => Some(ActivityType::DialogClosed),
        InstanceEventType::MessageRead => Some(ActivityType::DialogOpened),
        InstanceEventType::ConfirmedComplete | InstanceEventType::Other => None,
    }
}

fn service_owner() -> ActorRef {
    ActorRef {
        actor_type: ActorType::ServiceOwner,
        actor_id: None,
        actor_name: None,
    }
}

fn performed_by(actor: Option<&Actor>) -> ActorRef {
    actor.map(Actor::to_actor_ref).unwrap_or_else(service_owner)
}

/// Activities for `events`, oldest first.
///
/// A run of saves by the same actor becomes one `FormSaved` activity with
/// the id of the first save and the time of the last. Saves by the service
/// owner are dropped and do not break a run.
pub fn activities_from_events(dialog_id: Uuid, events: &[InstanceEvent]) -> Vec<Activity> {
    let mut sorted: Vec<&InstanceEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.created, e.id));

    let mut activities: Vec<Activity> = Vec::new();
    for event in sorted {
        let Some(kind) = activity_type(event.event_type) else {
            continue;
        };
        let actor = Actor::resolve(&event.user);
        let performed_by = performed_by(actor.as_ref());

        if kind == ActivityType::FormSaved {
            if actor.as_ref().is_some_and(Actor::is_service_owner) {
                continue;
            }
            if let Some(last) = activities.last_mut() {
                if last.activity_type == ActivityType::FormSaved && last.performed_by == performed_by {
                    last.created_at = event.created;
                    continue;
                }
            }
        }

        activities.push(Activity {
            id: child_id(dialog_id, "activity", &event.id.to_string(), event.created),
            created_at: event.created,
            activity_type: kind,
            performed_by,
            description: Vec::new(),
        });
    }
    activities
}

/// Submissions by the party and acceptances by the service owner.
///
/// `attachments_at` yields the attachments that belong to a transmission
/// sent at the given event.
pub fn transmissions_from_events<F>(
    dialog_id: Uuid,
    events: &[InstanceEvent],
    mut attachments_at: F,
) -> Vec<Transmission>
where
    F: FnMut(&InstanceEvent, TransmissionType) -> Vec<Attachment>,
{
    let mut sorted: Vec<&InstanceEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.created, e.id));

    sorted
        .into_iter()
        .filter_map(|event| {
            let (kind, sender) = match event.event_type {
                InstanceEventType::Submited => (
                    TransmissionType::Submission,
                    performed_by(Actor::resolve(&event.user).as_ref()),
                ),
                InstanceEventType::ConfirmedComplete => (TransmissionType::Acceptance, service_owner()),
                _ => return None,
            };
            Some(Transmission {
                id: child_id(dialog_id, "transmission", &event.id.to_string(), event.created),
                created_at: event.created,
                transmission_type: kind,
                sender,
                attachments: attachments_at(event, kind),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlatformUser;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap()
    }

    fn person(nin: &str) -> PlatformUser {
        PlatformUser {
            user_id: Some(1),
            national_identity_number: Some(nin.into()),
            ..Default::default()
        }
    }

    fn org_user() -> PlatformUser {
        PlatformUser {
            org_id: Some("acme".into()),
            ..Default::default()
        }
    }

    fn event(n: u128, minute: u32, event_type: InstanceEventType, user: PlatformUser) -> InstanceEvent {
        InstanceEvent {
            id: Uuid::from_u128(n),
            created: at(minute),
            event_type,
            user,
        }
    }

    #[test]
    fn test_consecutive_saves_collapse() {
        let dialog_id = Uuid::from_u128(99);
        let events = vec![
            event(1, 0, InstanceEventType::Created, person("1")),
            event(2, 1, InstanceEventType::Saved, person("1")),
            event(3, 2, InstanceEventType::Saved, person("1")),
            event(4, 3, InstanceEventType::Saved, org_user()),
            event(5, 4, InstanceEventType::Saved, person("1")),
            event(6, 5, InstanceEventType::Saved, person("2")),
            event(7, 6, InstanceEventType::Submited, person("2")),
        ];

        let activities = activities_from_events(dialog_id, &events);
        let kinds: Vec<_> = activities.iter().map(|a| a.activity_type).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityType::DialogCreated,
                ActivityType::FormSaved,
                ActivityType::FormSaved,
                ActivityType::FormSubmitted,
            ]
        );

        // First run keeps the id of its first save and the time of its last
        let first_run = &activities[1];
        assert_eq!(first_run.id, child_id(dialog_id, "activity", &Uuid::from_u128(2).to_string(), at(1)));
        assert_eq!(first_run.created_at, at(4));
        assert_eq!(activities[2].created_at, at(5));
    }

    #[test]
    fn test_service_owner_saves_ignored() {
        let events = vec![event(1, 0, InstanceEventType::Saved, org_user())];
        assert!(activities_from_events(Uuid::nil(), &events).is_empty());
    }

    #[test]
    fn test_ids_stable_across_calls() {
        let events = vec![
            event(2, 1, InstanceEventType::Saved, person("1")),
            event(1, 0, InstanceEventType::Created, person("1")),
        ];
        let a = activities_from_events(Uuid::from_u128(5), &events);
        let b = activities_from_events(Uuid::from_u128(5), &events);
        assert_eq!(a, b);
        assert_eq!(a[0].activity_type, ActivityType::DialogCreated);
    }

    #[test]
    fn test_transmissions() {
        let events = vec![
            event(1, 0, InstanceEventType::Submited, person("1")),
            event(2, 1, InstanceEventType::ConfirmedComplete, org_user()),
            event(3, 2, InstanceEventType::Saved, person("1")),
        ];
        let transmissions = transmissions_from_events(Uuid::nil(), &events, |_, _| Vec::new());
        assert_eq!(transmissions.len(), 2);
        assert_eq!(transmissions[0].transmission_type, TransmissionType::Submission);
        assert_eq!(transmissions[0].sender.actor_type, ActorType::PartyRepresentative);
        assert_eq!(transmissions[1].transmission_type, TransmissionType::Acceptance);
        assert_eq!(transmissions[1].sender.actor_type, ActorType::ServiceOwner);
    }
}
