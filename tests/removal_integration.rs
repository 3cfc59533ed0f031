//! Membership removal integration tests
//!
//! Builds the removal command on top of the real device directory and
//! dispatcher with in-memory backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use ara_push_relay::config::{CascadeConfig, FeatureFlags};
use ara_push_relay::device::{
    DeviceDirectory, DeviceKey, DeviceType, MemoryDirectoryBackend, PushRegistrationService,
    Registration,
};
use ara_push_relay::error::{AppError, Result};
use ara_push_relay::membership::{
    ActingUser, CascadeStatus, EventSink, EventSystemUser, MemoryEventLog,
    MemoryOrganizationUserStore, OrganizationUser, OrganizationUserEvent, OrganizationUserType, RemovalDependencies, RemoveOrganizationUserCommand,
    CANNOT_REMOVE_SELF, MANAGED_MEMBER, ONLY_OWNERS_DELETE_OWNERS, OWNER_REQUIRED, USERS_INVALID,
    USER_NOT_FOUND,
};
use ara_push_relay::notification::{MemoryPushTransport, NotificationDispatcher, PushType};

/// Registration service that fails organization revocation a set number of times
struct FlakyRegistrations {
    inner: Arc<DeviceDirectory>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

#[async_trait]
impl PushRegistrationService for FlakyRegistrations {
    async fn create_or_update_registration(&self, registration: Registration) -> Result<()> {
        self.inner.create_or_update_registration(registration).await
    }

    async fn delete_registration(&self, device: &DeviceKey) -> Result<()> {
        self.inner.delete_registration(device).await
    }

    async fn add_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        self.inner
            .add_user_registration_organization(devices, organization_id)
            .await
    }

    async fn delete_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Delivery("relay unreachable".to_string()));
        }
        self.inner
            .delete_user_registration_organization(devices, organization_id)
            .await
    }
}

/// Event sink whose backing store is unavailable
struct UnavailableEvents;

#[async_trait]
impl EventSink for UnavailableEvents {
    async fn log_event(&self, _event: OrganizationUserEvent) -> Result<()> {
        Err(AppError::Internal("event store unavailable".to_string()))
    }

    async fn log_events(&self, _events: Vec<OrganizationUserEvent>) -> Result<()> {
        Err(AppError::Internal("event store unavailable".to_string()))
    }
}

struct TestEnvironment {
    organization_id: Uuid,
    store: Arc<MemoryOrganizationUserStore>,
    events: Arc<MemoryEventLog>,
    directory: Arc<DeviceDirectory>,
    transport: Arc<MemoryPushTransport>,
    registrations: Arc<FlakyRegistrations>,
    command: RemoveOrganizationUserCommand,
}

fn cascade_config() -> CascadeConfig {
    CascadeConfig {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn create_test_environment(features: FeatureFlags, registration_failures: u32) -> TestEnvironment {
    let store = Arc::new(MemoryOrganizationUserStore::new());
    let events = Arc::new(MemoryEventLog::new());
    let directory = Arc::new(DeviceDirectory::new(Arc::new(MemoryDirectoryBackend::new())));
    let transport = Arc::new(MemoryPushTransport::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        directory.clone(),
        transport.clone(),
    ));
    let registrations = Arc::new(FlakyRegistrations {
        inner: directory.clone(),
        failures_left: AtomicU32::new(registration_failures),
        calls: AtomicU32::new(0),
    });

    let deps = RemovalDependencies {
        organization_users: store.clone(),
        events: events.clone(),
        owners: store.clone(),
        management: store.clone(),
        devices: directory.clone(),
        registrations: registrations.clone(),
        notifications: dispatcher,
    };
    let command = RemoveOrganizationUserCommand::new(deps, features, cascade_config()).unwrap();

    TestEnvironment {
        organization_id: Uuid::new_v4(),
        store,
        events,
        directory,
        transport,
        registrations,
        command,
    }
}

impl TestEnvironment {
    /// A command over the same members and devices whose event sink always fails
    fn command_with_unavailable_events(&self) -> RemoveOrganizationUserCommand {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            self.directory.clone(),
            self.transport.clone(),
        ));
        let deps = RemovalDependencies {
            organization_users: self.store.clone(),
            events: Arc::new(UnavailableEvents),
            owners: self.store.clone(),
            management: self.store.clone(),
            devices: self.directory.clone(),
            registrations: self.registrations.clone(),
            notifications: dispatcher,
        };
        RemoveOrganizationUserCommand::new(deps, FeatureFlags::default(), cascade_config()).unwrap()
    }
}

fn default_environment() -> TestEnvironment {
    create_test_environment(FeatureFlags::default(), 0)
}

impl TestEnvironment {
    fn add_member(&self, user_type: OrganizationUserType) -> OrganizationUser {
        let member = OrganizationUser::confirmed(self.organization_id, Uuid::new_v4(), user_type);
        self.store.insert(member.clone());
        member
    }

    fn add(&self, member: OrganizationUser) -> OrganizationUser {
        self.store.insert(member.clone());
        member
    }

    async fn register_device(&self, device_id: &str, user_id: Uuid, push_token: Option<&str>) {
        let mut registration = Registration::new(device_id, DeviceType::Android, user_id.to_string())
            .organizations([self.organization_id.to_string()]);
        if let Some(token) = push_token {
            registration = registration.push_token(token);
        }
        self.directory
            .create_or_update_registration(registration)
            .await
            .unwrap();
    }

    async fn device_organizations(&self, device_id: &str) -> Vec<String> {
        self.directory
            .get(&DeviceKey::new(device_id, DeviceType::Android))
            .await
            .unwrap()
            .map(|d| d.organization_ids.into_iter().collect())
            .unwrap_or_default()
    }
}

fn owner_actor(env: &TestEnvironment, member: &OrganizationUser) -> ActingUser {
    ActingUser::new(member.user_id.unwrap()).owner_of(env.organization_id)
}

fn assert_bad_request(result: Result<impl std::fmt::Debug>, message: &str) {
    match result {
        Err(AppError::BadRequest(reason)) => assert_eq!(reason, message),
        other => panic!("expected BadRequest({}), got {:?}", message, other),
    }
}

// ============================================================================
// Batch removal
// ============================================================================

#[tokio::test]
async fn test_batch_removing_every_owner_is_rejected_in_full() {
    let env = default_environment();
    let a = env.add_member(OrganizationUserType::Owner);
    let b = env.add_member(OrganizationUserType::Owner);
    let c = env.add_member(OrganizationUserType::User);
    let caller = ActingUser::new(Uuid::new_v4()).owner_of(env.organization_id);

    let result = env
        .command
        .remove_users(env.organization_id, &[a.id, b.id, c.id], Some(&caller))
        .await;

    assert_bad_request(result, OWNER_REQUIRED);
    assert_eq!(env.store.len(), 3);
    assert!(env.events.events().is_empty());
}

#[tokio::test]
async fn test_batch_reports_per_item_outcomes() {
    let env = create_test_environment(
        FeatureFlags {
            account_deprovisioning: true,
        },
        0,
    );
    let caller_membership = env.add_member(OrganizationUserType::Admin);
    let _remaining_owner = env.add_member(OrganizationUserType::Owner);
    let owner = env.add_member(OrganizationUserType::Owner);
    let managed = env.add(
        OrganizationUser::confirmed(env.organization_id, Uuid::new_v4(), OrganizationUserType::User)
            .managed(),
    );
    let plain = env.add_member(OrganizationUserType::User);
    let invited = env.add(OrganizationUser::invited(
        env.organization_id,
        OrganizationUserType::User,
    ));
    let caller = ActingUser::new(caller_membership.user_id.unwrap());

    let candidates = [caller_membership.id, owner.id, managed.id, plain.id, invited.id];
    let outcomes = env
        .command
        .remove_users(env.organization_id, &candidates, Some(&caller))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    let ids: Vec<Uuid> = outcomes.iter().map(|o| o.organization_user_id).collect();
    assert_eq!(ids, candidates.to_vec());

    assert_eq!(outcomes[0].error(), Some(CANNOT_REMOVE_SELF));
    assert_eq!(outcomes[1].error(), Some(ONLY_OWNERS_DELETE_OWNERS));
    assert_eq!(outcomes[2].error(), Some(MANAGED_MEMBER));
    assert_eq!(outcomes[3].result, Ok(CascadeStatus::Completed));
    assert_eq!(outcomes[4].result, Ok(CascadeStatus::Skipped));

    // Exactly the accepted items are gone, each with one event
    assert!(env.store.contains(caller_membership.id));
    assert!(env.store.contains(owner.id));
    assert!(env.store.contains(managed.id));
    assert!(!env.store.contains(plain.id));
    assert!(!env.store.contains(invited.id));

    let events = env.events.events();
    let logged: Vec<Uuid> = events.iter().map(|e| e.organization_user_id).collect();
    assert_eq!(logged, vec![plain.id, invited.id]);
    assert_eq!(events[0].date, events[1].date);
    assert_eq!(events[0].acting_user_id, Some(caller.user_id));
}

#[tokio::test]
async fn test_batch_ignores_other_organizations_and_duplicates() {
    let env = default_environment();
    let _owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);
    let elsewhere = env.add(OrganizationUser::confirmed(
        Uuid::new_v4(),
        Uuid::new_v4(),
        OrganizationUserType::User,
    ));

    let outcomes = env
        .command
        .remove_users(
            env.organization_id,
            &[member.id, elsewhere.id, member.id],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success());
    assert!(env.store.contains(elsewhere.id));
    assert_eq!(env.events.events().len(), 1);
}

#[tokio::test]
async fn test_batch_with_no_matching_members_fails() {
    let env = default_environment();
    let elsewhere = env.add(OrganizationUser::confirmed(
        Uuid::new_v4(),
        Uuid::new_v4(),
        OrganizationUserType::User,
    ));

    let result = env
        .command
        .remove_users(env.organization_id, &[elsewhere.id, Uuid::new_v4()], None)
        .await;

    assert_bad_request(result, USERS_INVALID);
}

#[tokio::test]
async fn test_batch_cascades_each_removed_user() {
    let env = default_environment();
    let _owner = env.add_member(OrganizationUserType::Owner);
    let first = env.add_member(OrganizationUserType::User);
    let second = env.add_member(OrganizationUserType::User);
    env.register_device("d1", first.user_id.unwrap(), Some("t1")).await;
    env.register_device("d2", second.user_id.unwrap(), Some("t2")).await;

    env.command
        .remove_users(env.organization_id, &[first.id, second.id], None)
        .await
        .unwrap();

    assert!(env.device_organizations("d1").await.is_empty());
    assert!(env.device_organizations("d2").await.is_empty());
    let resynced: Vec<String> = env
        .transport
        .deliveries()
        .into_iter()
        .filter(|d| d.message.push_type == PushType::SyncOrgKeys)
        .map(|d| d.device_id)
        .collect();
    assert_eq!(resynced.len(), 2);
}

// ============================================================================
// Single removal
// ============================================================================

#[tokio::test]
async fn test_non_owner_cannot_remove_owner() {
    let env = default_environment();
    let _a = env.add_member(OrganizationUserType::Owner);
    let b = env.add_member(OrganizationUserType::Owner);
    let caller = ActingUser::new(Uuid::new_v4());

    let result = env
        .command
        .remove_user(env.organization_id, b.id, &caller)
        .await;

    assert_bad_request(result, ONLY_OWNERS_DELETE_OWNERS);
    assert!(env.store.contains(b.id));
    assert!(env.events.events().is_empty());
}

#[tokio::test]
async fn test_cannot_remove_self_takes_precedence() {
    let env = default_environment();
    let _other_owner = env.add_member(OrganizationUserType::Owner);
    let me = env.add_member(OrganizationUserType::Owner);
    // Not recorded as an owner, so the owner rule would fail too
    let caller = ActingUser::new(me.user_id.unwrap());

    let result = env
        .command
        .remove_user(env.organization_id, me.id, &caller)
        .await;

    assert_bad_request(result, CANNOT_REMOVE_SELF);
}

#[tokio::test]
async fn test_last_owner_cannot_be_removed() {
    let env = default_environment();
    let only_owner = env.add_member(OrganizationUserType::Owner);

    let result = env
        .command
        .remove_user_as_system(env.organization_id, only_owner.id, EventSystemUser::Scim)
        .await;
    assert_bad_request(result, OWNER_REQUIRED);

    // Provider owners count for single removals
    env.store.add_provider_owner(env.organization_id);
    let receipt = env
        .command
        .remove_user_as_system(env.organization_id, only_owner.id, EventSystemUser::Scim)
        .await
        .unwrap();
    assert_eq!(receipt.organization_user_id, only_owner.id);
}

#[tokio::test]
async fn test_removal_cascades_devices_and_resyncs_keys() {
    let env = default_environment();
    let owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);
    let user_id = member.user_id.unwrap();
    env.register_device("d1", user_id, Some("t1")).await;
    env.register_device("d2", user_id, None).await;

    let receipt = env
        .command
        .remove_user(env.organization_id, member.id, &owner_actor(&env, &owner))
        .await
        .unwrap();

    assert_eq!(receipt.cascade, CascadeStatus::Completed);
    assert!(!env.store.contains(member.id));

    // Only devices with a push token are revoked
    assert!(env.device_organizations("d1").await.is_empty());
    assert_eq!(
        env.device_organizations("d2").await,
        vec![env.organization_id.to_string()]
    );

    let deliveries = env.transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].device_id, "d1");
    assert_eq!(deliveries[0].message.push_type, PushType::SyncOrgKeys);
    assert_eq!(deliveries[0].message.payload["userId"], user_id.to_string());

    let events = env.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].organization_user_id, member.id);
    assert_eq!(events[0].acting_user_id, owner.user_id);
}

#[tokio::test]
async fn test_missing_or_foreign_membership_not_found() {
    let env = default_environment();
    let owner = env.add_member(OrganizationUserType::Owner);
    let elsewhere = env.add(OrganizationUser::confirmed(
        Uuid::new_v4(),
        Uuid::new_v4(),
        OrganizationUserType::User,
    ));
    let caller = owner_actor(&env, &owner);

    for id in [Uuid::new_v4(), elsewhere.id] {
        match env.command.remove_user(env.organization_id, id, &caller).await {
            Err(AppError::NotFound(message)) => assert_eq!(message, USER_NOT_FOUND),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
    assert!(env.store.contains(elsewhere.id));
}

#[tokio::test]
async fn test_managed_member_requires_feature_flag() {
    let enabled = create_test_environment(
        FeatureFlags {
            account_deprovisioning: true,
        },
        0,
    );
    let _owner = enabled.add_member(OrganizationUserType::Owner);
    let managed = enabled.add(
        OrganizationUser::confirmed(
            enabled.organization_id,
            Uuid::new_v4(),
            OrganizationUserType::User,
        )
        .managed(),
    );
    let result = enabled
        .command
        .remove_user_as_system(enabled.organization_id, managed.id, EventSystemUser::Scim)
        .await;
    assert_bad_request(result, MANAGED_MEMBER);

    let disabled = default_environment();
    let _owner = disabled.add_member(OrganizationUserType::Owner);
    let managed = disabled.add(
        OrganizationUser::confirmed(
            disabled.organization_id,
            Uuid::new_v4(),
            OrganizationUserType::User,
        )
        .managed(),
    );
    assert!(disabled
        .command
        .remove_user_as_system(disabled.organization_id, managed.id, EventSystemUser::Scim)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_system_removal_records_system_user() {
    let env = default_environment();
    let _a = env.add_member(OrganizationUserType::Owner);
    let b = env.add_member(OrganizationUserType::Owner);

    env.command
        .remove_user_as_system(env.organization_id, b.id, EventSystemUser::DomainVerification)
        .await
        .unwrap();

    let events = env.events.events();
    assert_eq!(events[0].system_user, Some(EventSystemUser::DomainVerification));
    assert_eq!(events[0].acting_user_id, None);
}

#[tokio::test]
async fn test_remove_by_user_id() {
    let env = default_environment();
    let _owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);

    let receipt = env
        .command
        .remove_user_by_user_id(env.organization_id, member.user_id.unwrap())
        .await
        .unwrap();

    assert_eq!(receipt.organization_user_id, member.id);
    assert!(!env.store.contains(member.id));

    let result = env
        .command
        .remove_user_by_user_id(env.organization_id, Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_invited_member_skips_cascade() {
    let env = default_environment();
    let _owner = env.add_member(OrganizationUserType::Owner);
    let invited = env.add(OrganizationUser::invited(
        env.organization_id,
        OrganizationUserType::User,
    ));

    let receipt = env
        .command
        .remove_user_as_system(env.organization_id, invited.id, EventSystemUser::PublicApi)
        .await
        .unwrap();

    assert_eq!(receipt.cascade, CascadeStatus::Skipped);
    assert_eq!(env.registrations.calls.load(Ordering::SeqCst), 0);
    assert_eq!(env.events.events().len(), 1);
}

// ============================================================================
// Cascade failures
// ============================================================================

#[tokio::test]
async fn test_transient_cascade_failure_is_retried() {
    let env = create_test_environment(FeatureFlags::default(), 2);
    let _owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);
    env.register_device("d1", member.user_id.unwrap(), Some("t1")).await;

    let receipt = env
        .command
        .remove_user_as_system(env.organization_id, member.id, EventSystemUser::Scim)
        .await
        .unwrap();

    assert_eq!(receipt.cascade, CascadeStatus::Completed);
    assert_eq!(env.registrations.calls.load(Ordering::SeqCst), 3);
    assert!(env.device_organizations("d1").await.is_empty());
}

#[tokio::test]
async fn test_persistent_cascade_failure_is_surfaced_and_rerunnable() {
    let env = create_test_environment(FeatureFlags::default(), 10);
    let _owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);
    let user_id = member.user_id.unwrap();
    env.register_device("d1", user_id, Some("t1")).await;

    let receipt = env
        .command
        .remove_user_as_system(env.organization_id, member.id, EventSystemUser::Scim)
        .await
        .unwrap();

    // Deleted and logged, cascade reported as incomplete
    assert!(matches!(receipt.cascade, CascadeStatus::Incomplete { .. }));
    assert!(!env.store.contains(member.id));
    assert_eq!(env.events.events().len(), 1);
    assert_eq!(
        env.device_organizations("d1").await,
        vec![env.organization_id.to_string()]
    );

    // Relay recovers; re-running the cascade completes it
    env.registrations.failures_left.store(0, Ordering::SeqCst);
    let status = env.command.cascade(env.organization_id, Some(user_id)).await;
    assert_eq!(status, CascadeStatus::Completed);
    assert!(env.device_organizations("d1").await.is_empty());
}

// ============================================================================
// Event logging
// ============================================================================

#[tokio::test]
async fn test_event_log_failure_keeps_the_receipt() {
    let env = default_environment();
    let owner = env.add_member(OrganizationUserType::Owner);
    let member = env.add_member(OrganizationUserType::User);
    let user_id = member.user_id.unwrap();
    env.register_device("d1", user_id, Some("t1")).await;
    let command = env.command_with_unavailable_events();

    let receipt = command
        .remove_user(env.organization_id, member.id, &owner_actor(&env, &owner))
        .await
        .unwrap();

    assert_eq!(receipt.organization_user_id, member.id);
    assert_eq!(receipt.cascade, CascadeStatus::Completed);
    assert!(!env.store.contains(member.id));
    assert!(env.device_organizations("d1").await.is_empty());
}

#[tokio::test]
async fn test_event_log_failure_keeps_batch_outcomes() {
    let env = default_environment();
    let _owner = env.add_member(OrganizationUserType::Owner);
    let first = env.add_member(OrganizationUserType::User);
    let second = env.add_member(OrganizationUserType::User);
    env.register_device("d1", first.user_id.unwrap(), Some("t1")).await;
    let command = env.command_with_unavailable_events();

    let outcomes = command
        .remove_users(env.organization_id, &[first.id, second.id], None)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| o.result == Ok(CascadeStatus::Completed)));
    assert!(!env.store.contains(first.id));
    assert!(!env.store.contains(second.id));
    assert!(env.device_organizations("d1").await.is_empty());
}
