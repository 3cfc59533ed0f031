//! Capability interfaces over device registrations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::{Device, DeviceKey, Registration};

/// Push registration operations. Implemented by the local
/// [`DeviceDirectory`](super::DeviceDirectory) in hosted mode and by the relay
/// client in self-hosted mode; the implementation is chosen once at startup.
#[async_trait]
pub trait PushRegistrationService: Send + Sync {
    /// Upsert keyed by `(device_id, device_type)`
    async fn create_or_update_registration(&self, registration: Registration) -> Result<()>;

    /// Remove a registration. Unknown devices are a no-op.
    async fn delete_registration(&self, device: &DeviceKey) -> Result<()>;

    /// Entitle the devices to pushes of the organization. Empty sets are a no-op.
    async fn add_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()>;

    /// Revoke the organization from the devices. Empty sets are a no-op.
    async fn delete_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()>;
}

/// Read access to the devices owned by a user of this instance
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_many_by_user_id(&self, user_id: Uuid) -> Result<Vec<Device>>;
}
