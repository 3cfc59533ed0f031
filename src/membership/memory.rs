//! In-memory collaborators used in development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{
    EventSink, ManagementStatusQuery, OrganizationUser, OrganizationUserEvent,
    OrganizationUserStore, OwnerQuorum,
};

/// Memberships keyed by id. Also answers owner-quorum and managed-status
/// queries from the stored rows.
#[derive(Default)]
pub struct MemoryOrganizationUserStore {
    organization_users: DashMap<Uuid, OrganizationUser>,
    /// Confirmed owners granted through a provider, per organization
    provider_owners: DashMap<Uuid, usize>,
}

impl MemoryOrganizationUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, organization_user: OrganizationUser) {
        self.organization_users
            .insert(organization_user.id, organization_user);
    }

    pub fn add_provider_owner(&self, organization_id: Uuid) {
        *self.provider_owners.entry(organization_id).or_insert(0) += 1;
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.organization_users.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.organization_users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organization_users.is_empty()
    }
}

#[async_trait]
impl OrganizationUserStore for MemoryOrganizationUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<OrganizationUser>> {
        Ok(self.organization_users.get(&id).map(|u| u.clone()))
    }

    async fn get_by_organization_and_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationUser>> {
        Ok(self
            .organization_users
            .iter()
            .find(|u| u.organization_id == organization_id && u.user_id == Some(user_id))
            .map(|u| u.clone()))
    }

    async fn get_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<OrganizationUser>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.organization_users.get(id).map(|u| u.clone()))
            .collect())
    }

    async fn delete(&self, organization_user: &OrganizationUser) -> Result<()> {
        self.organization_users.remove(&organization_user.id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            self.organization_users.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl OwnerQuorum for MemoryOrganizationUserStore {
    async fn has_confirmed_owners_except(
        &self,
        organization_id: Uuid,
        excluded: &[Uuid],
        include_provider: bool,
    ) -> Result<bool> {
        let remaining = self.organization_users.iter().any(|u| {
            u.organization_id == organization_id
                && u.is_confirmed_owner()
                && !excluded.contains(&u.id)
        });
        if remaining {
            return Ok(true);
        }

        Ok(include_provider
            && self
                .provider_owners
                .get(&organization_id)
                .is_some_and(|count| *count > 0))
    }
}

#[async_trait]
impl ManagementStatusQuery for MemoryOrganizationUserStore {
    async fn get_management_status(
        &self,
        organization_id: Uuid,
        organization_user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>> {
        Ok(organization_user_ids
            .iter()
            .filter_map(|id| self.organization_users.get(id))
            .filter(|u| u.organization_id == organization_id)
            .map(|u| (u.id, u.managed))
            .collect())
    }
}

/// Append-only event log
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<OrganizationUserEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrganizationUserEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for MemoryEventLog {
    async fn log_event(&self, event: OrganizationUserEvent) -> Result<()> {
        self.log_events(vec![event]).await
    }

    async fn log_events(&self, events: Vec<OrganizationUserEvent>) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| AppError::Internal("event log poisoned".to_string()))?
            .extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::OrganizationUserType;

    #[tokio::test]
    async fn test_owner_quorum() {
        let store = MemoryOrganizationUserStore::new();
        let org = Uuid::new_v4();
        let owner = OrganizationUser::confirmed(org, Uuid::new_v4(), OrganizationUserType::Owner);
        let invited_owner = OrganizationUser::invited(org, OrganizationUserType::Owner);
        store.insert(owner.clone());
        store.insert(invited_owner.clone());

        assert!(store
            .has_confirmed_owners_except(org, &[invited_owner.id], false)
            .await
            .unwrap());
        assert!(!store
            .has_confirmed_owners_except(org, &[owner.id], false)
            .await
            .unwrap());

        store.add_provider_owner(org);
        assert!(!store
            .has_confirmed_owners_except(org, &[owner.id], false)
            .await
            .unwrap());
        assert!(store
            .has_confirmed_owners_except(org, &[owner.id], true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_management_status_scoped_to_organization() {
        let store = MemoryOrganizationUserStore::new();
        let org = Uuid::new_v4();
        let managed =
            OrganizationUser::confirmed(org, Uuid::new_v4(), OrganizationUserType::User).managed();
        let elsewhere =
            OrganizationUser::confirmed(Uuid::new_v4(), Uuid::new_v4(), OrganizationUserType::User);
        store.insert(managed.clone());
        store.insert(elsewhere.clone());

        let status = store
            .get_management_status(org, &[managed.id, elsewhere.id])
            .await
            .unwrap();
        assert_eq!(status.get(&managed.id), Some(&true));
        assert!(!status.contains_key(&elsewhere.id));
    }

    #[tokio::test]
    async fn test_lookup_and_delete() {
        let store = MemoryOrganizationUserStore::new();
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let member = OrganizationUser::confirmed(org, user, OrganizationUserType::User);
        store.insert(member.clone());

        let found = store.get_by_organization_and_user(org, user).await.unwrap();
        assert_eq!(found.as_ref().map(|u| u.id), Some(member.id));

        store.delete(&member).await.unwrap();
        assert!(store.is_empty());
        assert!(store.get_by_id(member.id).await.unwrap().is_none());
    }
}
