//! Removal of organization members and the push cascade that follows it.

mod memory;
mod remove;
mod store;
mod types;
pub mod validation;
mod validators;

pub use memory::{MemoryEventLog, MemoryOrganizationUserStore};
pub use remove::{
    RemovalDependencies, RemoveOrganizationUserCommand, USERS_INVALID, USER_NOT_FOUND,
};
pub use store::{EventSink, ManagementStatusQuery, OrganizationUserStore, OwnerQuorum};
pub use types::{
    ActingUser, CascadeStatus, EventSystemUser, EventType, OrganizationUser,
    OrganizationUserEvent, OrganizationUserStatus, OrganizationUserType, RemovalActor,
    RemovalOutcome, RemovalReceipt,
};
pub use validators::{
    removal_validators, RemovalCheck, CANNOT_REMOVE_SELF, MANAGED_MEMBER,
    ONLY_OWNERS_DELETE_OWNERS, OWNER_REQUIRED,
};
