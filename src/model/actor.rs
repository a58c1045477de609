//! Classification of the user that performed an instance event
//!
//! The origin store reports "performed by" as a bag of optional fields.
//! Rules are tried in order and the first that matches decides the actor.

use uuid::Uuid;

use super::dialog::{ActorRef, ActorType};
use super::instance::PlatformUser;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    SystemUser {
        id: Uuid,
        owner_org_no: Option<String>,
        name: Option<String>,
    },
    EndUserSystem {
        id: String,
    },
    PersonByRegistryLookup {
        national_identity_number: String,
    },
    /// Acting on behalf of the service owner
    OrganizationUser {
        org: String,
    },
    LegacyDisplayName {
        user_id: i64,
    },
}

type Rule = fn(&PlatformUser) -> Option<Actor>;

const RULES: &[Rule] = &[
    system_user,
    end_user_system,
    person,
    organization_user,
    legacy_user,
];

fn system_user(u: &PlatformUser) -> Option<Actor> {
    u.system_user_id.map(|id| Actor::SystemUser {
        id,
        owner_org_no: u.system_user_owner_org_no.clone(),
        name: u.system_user_name.clone(),
    })
}

fn end_user_system(u: &PlatformUser) -> Option<Actor> {
    non_blank(&u.end_user_system_id).map(|id| Actor::EndUserSystem { id })
}

fn person(u: &PlatformUser) -> Option<Actor> {
    non_blank(&u.national_identity_number).map(|national_identity_number| {
        Actor::PersonByRegistryLookup {
            national_identity_number,
        }
    })
}

fn organization_user(u: &PlatformUser) -> Option<Actor> {
    non_blank(&u.org_id).map(|org| Actor::OrganizationUser { org })
}

fn legacy_user(u: &PlatformUser) -> Option<Actor> {
    u.user_id.map(|user_id| Actor::LegacyDisplayName { user_id })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Actor {
    /// Resolve the actor of an event, `None` when no field identifies anyone
    pub fn resolve(user: &PlatformUser) -> Option<Actor> {
        RULES.iter().find_map(|rule| rule(user))
    }

    pub fn is_service_owner(&self) -> bool {
        matches!(self, Actor::OrganizationUser { .. })
    }

    /// Dialog-side representation
    pub fn to_actor_ref(&self) -> ActorRef {
        match self {
            Actor::SystemUser { id, name, .. } => ActorRef {
                actor_type: ActorType::PartyRepresentative,
                actor_id: Some(format!("urn:altinn:systemuser:uuid:{}", id)),
                actor_name: name.clone(),
            },
            Actor::EndUserSystem { id } => ActorRef {
                actor_type: ActorType::PartyRepresentative,
                actor_id: None,
                actor_name: Some(id.clone()),
            },
            Actor::PersonByRegistryLookup {
                national_identity_number,
            } => ActorRef {
                actor_type: ActorType::PartyRepresentative,
                actor_id: Some(format!(
                    "urn:altinn:person:identifier-no:{}",
                    national_identity_number
                )),
                actor_name: None,
            },
            Actor::OrganizationUser { .. } => ActorRef {
                actor_type: ActorType::ServiceOwner,
                actor_id: None,
                actor_name: None,
            },
            Actor::LegacyDisplayName { user_id } => ActorRef {
                actor_type: ActorType::PartyRepresentative,
                actor_id: None,
                actor_name: Some(format!("user {}", user_id)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_user_wins() {
        let user = PlatformUser {
            system_user_id: Some(Uuid::from_u128(7)),
            national_identity_number: Some("01017012345".into()),
            org_id: Some("acme".into()),
            ..Default::default()
        };
        assert!(matches!(
            Actor::resolve(&user),
            Some(Actor::SystemUser { .. })
        ));
    }

    #[test]
    fn test_rule_order() {
        let person = PlatformUser {
            national_identity_number: Some("01017012345".into()),
            user_id: Some(1337),
            ..Default::default()
        };
        assert_eq!(
            Actor::resolve(&person),
            Some(Actor::PersonByRegistryLookup {
                national_identity_number: "01017012345".into()
            })
        );

        let owner = PlatformUser {
            org_id: Some("acme".into()),
            user_id: Some(1337),
            ..Default::default()
        };
        let actor = Actor::resolve(&owner).unwrap();
        assert!(actor.is_service_owner());
        assert_eq!(actor.to_actor_ref().actor_type, ActorType::ServiceOwner);

        let legacy = PlatformUser {
            user_id: Some(1337),
            end_user_system_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            Actor::resolve(&legacy),
            Some(Actor::LegacyDisplayName { user_id: 1337 })
        );
    }

    #[test]
    fn test_nobody() {
        assert_eq!(Actor::resolve(&PlatformUser::default()), None);
    }
}
