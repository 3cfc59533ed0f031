use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationUserType {
    Owner,
    Admin,
    User,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationUserStatus {
    Revoked,
    Invited,
    Accepted,
    Confirmed,
}

/// Membership of a user in an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationUser {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// `None` until the invited user accepts
    pub user_id: Option<Uuid>,
    pub user_type: OrganizationUserType,
    pub status: OrganizationUserStatus,
    /// Account lifecycle centrally controlled by the organization
    pub managed: bool,
}

impl OrganizationUser {
    /// A confirmed membership of `user_id`
    pub fn confirmed(organization_id: Uuid, user_id: Uuid, user_type: OrganizationUserType) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id: Some(user_id),
            user_type,
            status: OrganizationUserStatus::Confirmed,
            managed: false,
        }
    }

    /// A pending invitation, not yet tied to a user
    pub fn invited(organization_id: Uuid, user_type: OrganizationUserType) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id: None,
            user_type,
            status: OrganizationUserStatus::Invited,
            managed: false,
        }
    }

    pub fn managed(mut self) -> Self {
        self.managed = true;
        self
    }

    pub fn is_owner(&self) -> bool {
        self.user_type == OrganizationUserType::Owner
    }

    pub fn is_confirmed_owner(&self) -> bool {
        self.is_owner() && self.status == OrganizationUserStatus::Confirmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrganizationUserRemoved,
}

/// Automated actor recorded on events raised without an acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSystemUser {
    Unknown,
    SsoJit,
    Scim,
    DomainVerification,
    PublicApi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationUserEvent {
    pub event_type: EventType,
    pub organization_id: Uuid,
    pub organization_user_id: Uuid,
    pub user_id: Option<Uuid>,
    pub acting_user_id: Option<Uuid>,
    pub system_user: Option<EventSystemUser>,
    pub date: DateTime<Utc>,
}

impl OrganizationUserEvent {
    pub fn removed(organization_user: &OrganizationUser, date: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::OrganizationUserRemoved,
            organization_id: organization_user.organization_id,
            organization_user_id: organization_user.id,
            user_id: organization_user.user_id,
            acting_user_id: None,
            system_user: None,
            date,
        }
    }

    pub fn by(mut self, actor: &RemovalActor) -> Self {
        self.acting_user_id = actor.acting_user().map(|a| a.user_id);
        self.system_user = actor.system_user();
        self
    }
}

/// The user performing an interactive removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser {
    pub user_id: Uuid,
    owned_organizations: HashSet<Uuid>,
}

impl ActingUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            owned_organizations: HashSet::new(),
        }
    }

    pub fn owner_of(mut self, organization_id: Uuid) -> Self {
        self.owned_organizations.insert(organization_id);
        self
    }

    pub fn is_owner_of(&self, organization_id: Uuid) -> bool {
        self.owned_organizations.contains(&organization_id)
    }
}

/// Who is performing a removal. System removals skip the self-removal and
/// owner-only rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalActor {
    User(ActingUser),
    System(Option<EventSystemUser>),
}

impl RemovalActor {
    pub fn acting_user(&self) -> Option<&ActingUser> {
        match self {
            RemovalActor::User(user) => Some(user),
            RemovalActor::System(_) => None,
        }
    }

    pub fn system_user(&self) -> Option<EventSystemUser> {
        match self {
            RemovalActor::User(_) => None,
            RemovalActor::System(system_user) => *system_user,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            RemovalActor::User(_) => "interactive",
            RemovalActor::System(_) => "system",
        }
    }
}

/// State of the device deregistration and key resync after a deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CascadeStatus {
    Completed,
    /// Membership had no user (pending invitation)
    Skipped,
    /// Membership deleted but the cascade kept failing; safe to re-run
    Incomplete { reason: String },
}

impl CascadeStatus {
    pub fn is_complete(&self) -> bool {
        !matches!(self, CascadeStatus::Incomplete { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReceipt {
    pub organization_user_id: Uuid,
    pub cascade: CascadeStatus,
}

/// Per-candidate result of a batch removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub organization_user_id: Uuid,
    pub result: Result<CascadeStatus, String>,
}

impl RemovalOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}
