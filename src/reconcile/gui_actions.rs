//! GUI actions
//!
//! The instance contributes up to three actions of its own. Anything else on
//! the dialog was added by someone else and is kept as it is. Computed
//! actions then compete for the remaining slots of each priority tier.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::model::ids::child_id;
use crate::model::{Application, GuiAction, GuiActionPriority, Instance, Localization};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedAction {
    GoTo,
    Delete,
    Copy,
}

impl OwnedAction {
    pub const ALL: [OwnedAction; 3] = [Self::GoTo, Self::Delete, Self::Copy];

    fn key(&self) -> &'static str {
        match self {
            Self::GoTo => "goto",
            Self::Delete => "delete",
            Self::Copy => "copy",
        }
    }

    fn priority(&self) -> GuiActionPriority {
        match self {
            Self::GoTo => GuiActionPriority::Primary,
            Self::Delete => GuiActionPriority::Secondary,
            Self::Copy => GuiActionPriority::Tertiary,
        }
    }

    pub fn id(&self, dialog_id: Uuid, created: DateTime<Utc>) -> Uuid {
        child_id(dialog_id, "gui-action", self.key(), created)
    }
}

/// Ids of every action this side may put on the dialog
pub fn owned_ids(dialog_id: Uuid, created: DateTime<Utc>) -> HashSet<Uuid> {
    OwnedAction::ALL
        .iter()
        .map(|a| a.id(dialog_id, created))
        .collect()
}

/// Actions the instance calls for right now
pub fn compute_actions(
    dialog_id: Uuid,
    instance: &Instance,
    application: &Application,
    app_url: &str,
) -> Vec<GuiAction> {
    let archived = instance.status.is_archived;
    let mut wanted = vec![OwnedAction::GoTo];
    if !archived && !application.prevent_deletion {
        wanted.push(OwnedAction::Delete);
    }
    if archived && application.allow_copy {
        wanted.push(OwnedAction::Copy);
    }

    wanted
        .into_iter()
        .map(|kind| {
            let (action, method, url, title) = match kind {
                OwnedAction::GoTo => (
                    "read",
                    "GET",
                    format!("{}/#/instance/{}", app_url, instance.id),
                    "Go to form",
                ),
                OwnedAction::Delete => (
                    "delete",
                    "DELETE",
                    format!("{}/instances/{}", app_url, instance.id),
                    "Delete",
                ),
                OwnedAction::Copy => (
                    "instantiate",
                    "POST",
                    format!("{}/instances/{}/copy", app_url, instance.id),
                    "Copy",
                ),
            };
            GuiAction {
                id: kind.id(dialog_id, instance.created),
                action: action.to_string(),
                url,
                http_method: method.to_string(),
                priority: kind.priority(),
                is_delete_dialog_action: kind == OwnedAction::Delete,
                title: vec![Localization::new(title, "en")],
            }
        })
        .collect()
}

/// Fit `computed` around the `external` actions.
///
/// Computed actions that duplicate an external one are dropped. The rest are
/// taken in (priority, id) order and fill the tiers from the top. An action
/// whose own tier is full moves down to the next tier with room, but never up
/// into a tier above its own. Whatever is left once the tiers are full is
/// discarded.
pub fn pack(external: Vec<GuiAction>, computed: Vec<GuiAction>) -> Vec<GuiAction> {
    let mut candidates: Vec<GuiAction> = computed
        .into_iter()
        .filter(|c| !external.iter().any(|e| e.same_identity(c)))
        .collect();
    candidates.sort_by_key(|a| (a.priority, a.id));
    let mut queue = candidates.into_iter().peekable();

    let mut packed = Vec::new();
    for tier in GuiActionPriority::ALL {
        let taken = external.iter().filter(|e| e.priority == tier).count();
        let mut free = tier.capacity().saturating_sub(taken);
        while free > 0 {
            match queue.next_if(|next| next.priority <= tier) {
                Some(mut action) => {
                    action.priority = tier;
                    packed.push(action);
                    free -= 1;
                }
                None => break,
            }
        }
    }

    let mut actions = external;
    actions.extend(packed);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(n: u128, name: &str, priority: GuiActionPriority) -> GuiAction {
        GuiAction {
            id: Uuid::from_u128(n),
            action: name.to_string(),
            url: format!("https://example.test/{}", name),
            http_method: "GET".into(),
            priority,
            is_delete_dialog_action: false,
            title: vec![],
        }
    }

    #[test]
    fn test_no_promotion_into_free_primary() {
        let external = vec![action(1, "external", GuiActionPriority::Secondary)];
        let computed = vec![action(2, "mine", GuiActionPriority::Secondary)];

        let packed = pack(external.clone(), computed);
        assert_eq!(packed.len(), 2);
        assert!(packed.iter().all(|a| a.priority != GuiActionPriority::Primary));
        assert_eq!(packed[1].id, Uuid::from_u128(2));
        assert_eq!(packed[1].priority, GuiActionPriority::Tertiary);
    }

    #[test]
    fn test_discarded_when_no_lower_tier_has_room() {
        let mut external = vec![action(1, "external", GuiActionPriority::Secondary)];
        external.extend((10..15).map(|n| action(n, &format!("t{n}"), GuiActionPriority::Tertiary)));
        let computed = vec![action(2, "mine", GuiActionPriority::Secondary)];

        let packed = pack(external.clone(), computed);
        assert_eq!(packed, external);
    }

    #[test]
    fn test_capacity_respected() {
        let computed: Vec<_> = (0..8)
            .map(|n| action(n, &format!("t{n}"), GuiActionPriority::Tertiary))
            .collect();
        let packed = pack(vec![], computed);
        assert_eq!(packed.len(), GuiActionPriority::Tertiary.capacity());
        assert!(packed.iter().all(|a| a.priority == GuiActionPriority::Tertiary));
        // Lowest ids win
        assert_eq!(packed[0].id, Uuid::from_u128(0));
    }

    #[test]
    fn test_second_primary_moves_down() {
        let computed = vec![
            action(1, "a", GuiActionPriority::Primary),
            action(2, "b", GuiActionPriority::Primary),
            action(3, "c", GuiActionPriority::Tertiary),
        ];
        let packed = pack(vec![], computed);
        let placed: Vec<_> = packed.iter().map(|a| (a.id, a.priority)).collect();
        assert_eq!(
            placed,
            vec![
                (Uuid::from_u128(1), GuiActionPriority::Primary),
                (Uuid::from_u128(2), GuiActionPriority::Secondary),
                (Uuid::from_u128(3), GuiActionPriority::Tertiary),
            ]
        );
    }

    #[test]
    fn test_computed_primary_below_external_primary() {
        let external = vec![action(1, "external", GuiActionPriority::Primary)];
        let computed = vec![action(2, "mine", GuiActionPriority::Primary)];

        let packed = pack(external.clone(), computed);
        assert_eq!(packed[0], external[0]);
        assert_eq!(packed[1].id, Uuid::from_u128(2));
        assert_eq!(packed[1].priority, GuiActionPriority::Secondary);
    }

    #[test]
    fn test_lower_tier_not_pulled_up() {
        let computed = vec![action(1, "a", GuiActionPriority::Tertiary)];
        let packed = pack(vec![], computed);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].priority, GuiActionPriority::Tertiary);
    }

    #[test]
    fn test_duplicate_of_external_dropped() {
        let mut external = action(1, "read", GuiActionPriority::Tertiary);
        external.http_method = "get".into();
        let computed = vec![action(2, "read", GuiActionPriority::Primary)];

        let packed = pack(vec![external.clone()], computed);
        assert_eq!(packed, vec![external]);
    }

    #[test]
    fn test_computed_actions_follow_instance_state() {
        let app = Application {
            allow_copy: true,
            ..Default::default()
        };
        let mut instance = Instance {
            id: "50001/00000000-0000-0000-0000-000000000001".into(),
            ..Default::default()
        };

        let open = compute_actions(Uuid::nil(), &instance, &app, "https://acme.apps/x");
        assert_eq!(open.len(), 2);
        assert!(open[1].is_delete_dialog_action);

        instance.status.is_archived = true;
        let archived = compute_actions(Uuid::nil(), &instance, &app, "https://acme.apps/x");
        let names: Vec<_> = archived.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(names, vec!["read", "instantiate"]);

        let owned = owned_ids(Uuid::nil(), instance.created);
        assert!(archived.iter().all(|a| owned.contains(&a.id)));
    }
}
