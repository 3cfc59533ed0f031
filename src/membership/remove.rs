use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::backoff::{retry_with_backoff, BackoffConfig};
use crate::config::{CascadeConfig, FeatureFlags};
use crate::device::{Device, DeviceKey, DeviceRepository, PushRegistrationService};
use crate::error::{AppError, Result};
use crate::metrics::RemovalMetrics;
use crate::notification::PushNotificationService;

use super::validation::ValidatorRegistry;
use super::validators::{removal_validators, RemovalCheck, OWNER_REQUIRED};
use super::{
    ActingUser, CascadeStatus, EventSink, EventSystemUser, ManagementStatusQuery,
    OrganizationUser, OrganizationUserEvent, OrganizationUserStore, OwnerQuorum, RemovalActor,
    RemovalOutcome, RemovalReceipt,
};

pub const USER_NOT_FOUND: &str = "User not found.";
pub const USERS_INVALID: &str = "Users invalid.";

/// Collaborators of the removal command
#[derive(Clone)]
pub struct RemovalDependencies {
    pub organization_users: Arc<dyn OrganizationUserStore>,
    pub events: Arc<dyn EventSink>,
    pub owners: Arc<dyn OwnerQuorum>,
    pub management: Arc<dyn ManagementStatusQuery>,
    pub devices: Arc<dyn DeviceRepository>,
    pub registrations: Arc<dyn PushRegistrationService>,
    pub notifications: Arc<dyn PushNotificationService>,
}

/// Removes members from organizations.
///
/// Each removal runs validate, delete, cascade, then log the event, in that
/// order. Invariants are checked before anything is mutated. Once the
/// membership is deleted, the cascade (organization revoked from the user's
/// devices, key resync pushed) is retried and its final state reported in
/// the result instead of rolling the deletion back. A failure to record the
/// event is logged and does not fail the removal.
pub struct RemoveOrganizationUserCommand {
    deps: RemovalDependencies,
    validators: ValidatorRegistry<RemovalCheck>,
    features: FeatureFlags,
    cascade: CascadeConfig,
}

impl RemoveOrganizationUserCommand {
    pub fn new(
        deps: RemovalDependencies,
        features: FeatureFlags,
        cascade: CascadeConfig,
    ) -> Result<Self> {
        let validators =
            removal_validators().map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self {
            deps,
            validators,
            features,
            cascade,
        })
    }

    /// Interactive removal by membership id
    #[tracing::instrument(
        name = "removal.remove_user",
        skip(self, acting_user),
        fields(acting_user_id = %acting_user.user_id)
    )]
    pub async fn remove_user(
        &self,
        organization_id: Uuid,
        organization_user_id: Uuid,
        acting_user: &ActingUser,
    ) -> Result<RemovalReceipt> {
        let organization_user = self
            .deps
            .organization_users
            .get_by_id(organization_user_id)
            .await?;
        self.remove(
            organization_id,
            organization_user,
            RemovalActor::User(acting_user.clone()),
        )
        .await
    }

    /// Removal by membership id on behalf of an automated actor
    #[tracing::instrument(name = "removal.remove_user_as_system", skip(self))]
    pub async fn remove_user_as_system(
        &self,
        organization_id: Uuid,
        organization_user_id: Uuid,
        system_user: EventSystemUser,
    ) -> Result<RemovalReceipt> {
        let organization_user = self
            .deps
            .organization_users
            .get_by_id(organization_user_id)
            .await?;
        self.remove(
            organization_id,
            organization_user,
            RemovalActor::System(Some(system_user)),
        )
        .await
    }

    /// Removal of a user's membership, without an acting user
    #[tracing::instrument(name = "removal.remove_user_by_user_id", skip(self))]
    pub async fn remove_user_by_user_id(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<RemovalReceipt> {
        let organization_user = self
            .deps
            .organization_users
            .get_by_organization_and_user(organization_id, user_id)
            .await?;
        self.remove(organization_id, organization_user, RemovalActor::System(None))
            .await
    }

    async fn remove(
        &self,
        organization_id: Uuid,
        organization_user: Option<OrganizationUser>,
        actor: RemovalActor,
    ) -> Result<RemovalReceipt> {
        let organization_user = organization_user
            .filter(|u| u.organization_id == organization_id)
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        let retains_owner = if organization_user.is_owner() {
            self.deps
                .owners
                .has_confirmed_owners_except(organization_id, &[organization_user.id], true)
                .await?
        } else {
            true
        };
        let managed = self
            .management_status(organization_id, &[organization_user.id])
            .await?
            .get(&organization_user.id)
            .copied()
            .unwrap_or(false);

        let check = RemovalCheck::new(&organization_user, &actor)
            .retains_owner(retains_owner)
            .managed(managed);
        if let Err(rejection) = self.validators.evaluate(&check) {
            RemovalMetrics::record_rejected(actor.mode());
            tracing::info!(
                organization_id = %organization_id,
                organization_user_id = %organization_user.id,
                validator = rejection.validator,
                "Removal rejected"
            );
            return Err(AppError::BadRequest(rejection.reason));
        }

        self.deps.organization_users.delete(&organization_user).await?;
        let cascade = self.cascade(organization_id, organization_user.user_id).await;
        if let Err(e) = self
            .deps
            .events
            .log_event(OrganizationUserEvent::removed(&organization_user, Utc::now()).by(&actor))
            .await
        {
            tracing::error!(
                organization_user_id = %organization_user.id,
                error = %e,
                "Failed to log removal event"
            );
        }

        RemovalMetrics::record_removed(actor.mode());
        tracing::info!(
            organization_id = %organization_id,
            organization_user_id = %organization_user.id,
            cascade_complete = cascade.is_complete(),
            "Organization user removed"
        );

        Ok(RemovalReceipt {
            organization_user_id: organization_user.id,
            cascade,
        })
    }

    /// Remove many members of one organization.
    ///
    /// Fails as a whole only when none of the ids belong to the organization
    /// or when the batch would leave no confirmed owner. Otherwise returns one
    /// outcome per distinct candidate, in input order.
    #[tracing::instrument(
        name = "removal.remove_users",
        skip(self, organization_user_ids, acting_user),
        fields(candidates = organization_user_ids.len())
    )]
    pub async fn remove_users(
        &self,
        organization_id: Uuid,
        organization_user_ids: &[Uuid],
        acting_user: Option<&ActingUser>,
    ) -> Result<Vec<RemovalOutcome>> {
        let actor = match acting_user {
            Some(user) => RemovalActor::User(user.clone()),
            None => RemovalActor::System(None),
        };

        let mut loaded: HashMap<Uuid, OrganizationUser> = self
            .deps
            .organization_users
            .get_many_by_ids(organization_user_ids)
            .await?
            .into_iter()
            .filter(|u| u.organization_id == organization_id)
            .map(|u| (u.id, u))
            .collect();
        let candidates: Vec<OrganizationUser> = organization_user_ids
            .iter()
            .filter_map(|id| loaded.remove(id))
            .collect();
        if candidates.is_empty() {
            return Err(AppError::BadRequest(USERS_INVALID.to_string()));
        }

        let candidate_ids: Vec<Uuid> = candidates.iter().map(|u| u.id).collect();
        if !self
            .deps
            .owners
            .has_confirmed_owners_except(organization_id, &candidate_ids, false)
            .await?
        {
            RemovalMetrics::record_rejected(actor.mode());
            return Err(AppError::BadRequest(OWNER_REQUIRED.to_string()));
        }

        let management = self
            .management_status(organization_id, &candidate_ids)
            .await?;

        let mut results: Vec<Option<std::result::Result<CascadeStatus, String>>> =
            Vec::with_capacity(candidates.len());
        let mut accepted: Vec<&OrganizationUser> = Vec::new();
        for candidate in &candidates {
            // Owner quorum already holds for the whole batch
            let check = RemovalCheck::new(candidate, &actor)
                .managed(management.get(&candidate.id).copied().unwrap_or(false));

            match self.validators.evaluate(&check) {
                Ok(()) => {
                    tracing::info!(
                        organization_user_id = %candidate.id,
                        "Removal accepted"
                    );
                    accepted.push(candidate);
                    results.push(None);
                }
                Err(rejection) => {
                    RemovalMetrics::record_rejected(actor.mode());
                    tracing::info!(
                        organization_user_id = %candidate.id,
                        validator = rejection.validator,
                        "Removal rejected"
                    );
                    results.push(Some(Err(rejection.reason)));
                }
            }
        }

        if !accepted.is_empty() {
            let ids: Vec<Uuid> = accepted.iter().map(|u| u.id).collect();
            self.deps.organization_users.delete_many(&ids).await?;

            let mut cascades: HashMap<Uuid, CascadeStatus> = HashMap::new();
            for organization_user in &accepted {
                let status = self.cascade(organization_id, organization_user.user_id).await;
                cascades.insert(organization_user.id, status);
                RemovalMetrics::record_removed(actor.mode());
            }

            let date = Utc::now();
            let events = accepted
                .iter()
                .map(|u| OrganizationUserEvent::removed(u, date).by(&actor))
                .collect();
            if let Err(e) = self.deps.events.log_events(events).await {
                tracing::error!(
                    organization_id = %organization_id,
                    removed = accepted.len(),
                    error = %e,
                    "Failed to log removal events"
                );
            }

            for (candidate, result) in candidates.iter().zip(results.iter_mut()) {
                if result.is_none() {
                    *result = cascades.remove(&candidate.id).map(Ok);
                }
            }
        }

        let outcomes: Vec<RemovalOutcome> = candidates
            .iter()
            .zip(results)
            .map(|(candidate, result)| RemovalOutcome {
                organization_user_id: candidate.id,
                result: result.unwrap_or(Ok(CascadeStatus::Completed)),
            })
            .collect();

        tracing::info!(
            organization_id = %organization_id,
            removed = accepted.len(),
            rejected = outcomes.len() - accepted.len(),
            "Batch removal finished"
        );

        Ok(outcomes)
    }

    /// Revoke the organization from the user's devices and push a key resync.
    ///
    /// Idempotent; callers may re-run it for a removal whose cascade was
    /// reported incomplete.
    #[tracing::instrument(name = "removal.cascade", skip(self))]
    pub async fn cascade(&self, organization_id: Uuid, user_id: Option<Uuid>) -> CascadeStatus {
        let Some(user_id) = user_id else {
            return CascadeStatus::Skipped;
        };

        let result = retry_with_backoff(
            "removal.cascade",
            self.cascade.max_attempts,
            BackoffConfig::from(&self.cascade),
            || self.cascade_once(organization_id, user_id),
        )
        .await;

        match result {
            Ok(()) => CascadeStatus::Completed,
            Err(e) => {
                RemovalMetrics::record_cascade_failure();
                tracing::error!(
                    organization_id = %organization_id,
                    user_id = %user_id,
                    error = %e,
                    "Removal cascade incomplete"
                );
                CascadeStatus::Incomplete {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn cascade_once(&self, organization_id: Uuid, user_id: Uuid) -> Result<()> {
        let devices: Vec<DeviceKey> = self
            .deps
            .devices
            .get_many_by_user_id(user_id)
            .await?
            .iter()
            .filter(|d| d.has_push_token())
            .map(Device::key)
            .collect();

        self.deps
            .registrations
            .delete_user_registration_organization(&devices, &organization_id.to_string())
            .await?;
        self.deps
            .notifications
            .push_sync_org_keys(&user_id.to_string())
            .await
    }

    async fn management_status(
        &self,
        organization_id: Uuid,
        organization_user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, bool>> {
        if !self.features.account_deprovisioning {
            return Ok(HashMap::new());
        }
        self.deps
            .management
            .get_management_status(organization_id, organization_user_ids)
            .await
    }
}
