//! Collaborator interfaces consumed by the removal command.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::{OrganizationUser, OrganizationUserEvent};

#[async_trait]
pub trait OrganizationUserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<OrganizationUser>>;

    async fn get_by_organization_and_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationUser>>;

    async fn get_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<OrganizationUser>>;

    async fn delete(&self, organization_user: &OrganizationUser) -> Result<()>;

    async fn delete_many(&self, ids: &[Uuid]) -> Result<()>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn log_event(&self, event: OrganizationUserEvent) -> Result<()>;

    async fn log_events(&self, events: Vec<OrganizationUserEvent>) -> Result<()>;
}

#[async_trait]
pub trait OwnerQuorum: Send + Sync {
    /// Whether the organization keeps a confirmed owner once `excluded` are gone.
    /// `include_provider` also counts owners granted through a provider.
    async fn has_confirmed_owners_except(
        &self,
        organization_id: Uuid,
        excluded: &[Uuid],
        include_provider: bool,
    ) -> Result<bool>;
}

#[async_trait]
pub trait ManagementStatusQuery: Send + Sync {
    /// Managed flag per membership id. Unknown ids are absent from the map.
    async fn get_management_status(
        &self,
        organization_id: Uuid,
        organization_user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>>;
}
