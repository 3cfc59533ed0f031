//! Invariants checked before a membership is removed.

use uuid::Uuid;

use super::validation::{RegistryError, Validator, ValidatorRegistry};
use super::{OrganizationUser, RemovalActor};

pub const CANNOT_REMOVE_SELF: &str = "You cannot remove yourself.";
pub const ONLY_OWNERS_DELETE_OWNERS: &str = "Only owners can delete other owners.";
pub const OWNER_REQUIRED: &str = "Organization must have at least one confirmed owner.";
pub const MANAGED_MEMBER: &str =
    "Managed members cannot be simply removed, their entire individual account must be deleted.";

/// Facts about one removal candidate, loaded before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalCheck {
    pub target_user_id: Option<Uuid>,
    pub target_is_owner: bool,
    pub acting_user_id: Option<Uuid>,
    pub acting_user_is_owner: bool,
    /// A confirmed owner remains once the target is gone
    pub retains_owner: bool,
    pub managed: bool,
}

impl RemovalCheck {
    pub fn new(target: &OrganizationUser, actor: &RemovalActor) -> Self {
        let acting_user = actor.acting_user();
        Self {
            target_user_id: target.user_id,
            target_is_owner: target.is_owner(),
            acting_user_id: acting_user.map(|a| a.user_id),
            acting_user_is_owner: acting_user
                .is_some_and(|a| a.is_owner_of(target.organization_id)),
            retains_owner: true,
            managed: false,
        }
    }

    pub fn retains_owner(mut self, retains_owner: bool) -> Self {
        self.retains_owner = retains_owner;
        self
    }

    pub fn managed(mut self, managed: bool) -> Self {
        self.managed = managed;
        self
    }
}

pub struct SelfRemoval;

impl Validator<RemovalCheck> for SelfRemoval {
    fn name(&self) -> &'static str {
        "self_removal"
    }

    fn validate(&self, check: &RemovalCheck) -> Result<(), String> {
        match check.acting_user_id {
            Some(acting) if check.target_user_id == Some(acting) => {
                Err(CANNOT_REMOVE_SELF.to_string())
            }
            _ => Ok(()),
        }
    }
}

pub struct OwnerOnly;

impl Validator<RemovalCheck> for OwnerOnly {
    fn name(&self) -> &'static str {
        "owner_only"
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["self_removal"]
    }

    fn validate(&self, check: &RemovalCheck) -> Result<(), String> {
        if check.target_is_owner && check.acting_user_id.is_some() && !check.acting_user_is_owner {
            return Err(ONLY_OWNERS_DELETE_OWNERS.to_string());
        }
        Ok(())
    }
}

pub struct OwnerQuorumRule;

impl Validator<RemovalCheck> for OwnerQuorumRule {
    fn name(&self) -> &'static str {
        "owner_quorum"
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["owner_only"]
    }

    fn validate(&self, check: &RemovalCheck) -> Result<(), String> {
        if check.retains_owner {
            Ok(())
        } else {
            Err(OWNER_REQUIRED.to_string())
        }
    }
}

pub struct ManagedAccount;

impl Validator<RemovalCheck> for ManagedAccount {
    fn name(&self) -> &'static str {
        "managed_account"
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["owner_quorum"]
    }

    fn validate(&self, check: &RemovalCheck) -> Result<(), String> {
        if check.managed {
            Err(MANAGED_MEMBER.to_string())
        } else {
            Ok(())
        }
    }
}

/// Removal invariants in evaluation order: self-removal, owner-only,
/// owner quorum, managed account
pub fn removal_validators() -> Result<ValidatorRegistry<RemovalCheck>, RegistryError> {
    ValidatorRegistry::builder()
        .register(ManagedAccount)
        .register(OwnerQuorumRule)
        .register(OwnerOnly)
        .register(SelfRemoval)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{ActingUser, EventSystemUser, OrganizationUserType};

    fn owner(org: Uuid, user: Uuid) -> OrganizationUser {
        OrganizationUser::confirmed(org, user, OrganizationUserType::Owner)
    }

    #[test]
    fn test_evaluation_order() {
        let registry = removal_validators().unwrap();
        assert_eq!(
            registry.names(),
            vec!["self_removal", "owner_only", "owner_quorum", "managed_account"]
        );
    }

    #[test]
    fn test_self_removal_takes_precedence() {
        let registry = removal_validators().unwrap();
        let org = Uuid::new_v4();
        let me = Uuid::new_v4();
        // Non-owner removing their own owner membership violates both rules
        let actor = RemovalActor::User(ActingUser::new(me));
        let check = RemovalCheck::new(&owner(org, me), &actor).managed(true);

        let rejection = registry.evaluate(&check).unwrap_err();
        assert_eq!(rejection.reason, CANNOT_REMOVE_SELF);
    }

    #[test]
    fn test_non_owner_cannot_remove_owner() {
        let registry = removal_validators().unwrap();
        let org = Uuid::new_v4();
        let actor = RemovalActor::User(ActingUser::new(Uuid::new_v4()));
        let check = RemovalCheck::new(&owner(org, Uuid::new_v4()), &actor);

        assert_eq!(
            registry.evaluate(&check).unwrap_err().reason,
            ONLY_OWNERS_DELETE_OWNERS
        );

        let actor = RemovalActor::User(ActingUser::new(Uuid::new_v4()).owner_of(org));
        let check = RemovalCheck::new(&owner(org, Uuid::new_v4()), &actor);
        assert!(registry.evaluate(&check).is_ok());
    }

    #[test]
    fn test_system_skips_actor_rules_but_not_managed() {
        let registry = removal_validators().unwrap();
        let org = Uuid::new_v4();
        let actor = RemovalActor::System(Some(EventSystemUser::Scim));
        let target = owner(org, Uuid::new_v4());

        assert!(registry.evaluate(&RemovalCheck::new(&target, &actor)).is_ok());
        assert_eq!(
            registry
                .evaluate(&RemovalCheck::new(&target, &actor).retains_owner(false))
                .unwrap_err()
                .reason,
            OWNER_REQUIRED
        );
        assert_eq!(
            registry
                .evaluate(&RemovalCheck::new(&target, &actor).managed(true))
                .unwrap_err()
                .reason,
            MANAGED_MEMBER
        );
    }
}
