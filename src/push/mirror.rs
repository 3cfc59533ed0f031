use std::sync::Arc;

use async_trait::async_trait;

use crate::device::{DeviceDirectory, DeviceKey, PushRegistrationService, Registration};
use crate::error::Result;
use crate::relay::RelayPushRegistrationService;

/// Registration service of a self-hosted instance.
///
/// Every mutation is applied to the local directory first, so the removal
/// cascade can find the user's devices, then forwarded to the relay. Both
/// sides are idempotent; a failed relay call can be repeated as a whole.
pub struct MirroredRegistrationService {
    directory: Arc<DeviceDirectory>,
    relay: RelayPushRegistrationService,
}

impl MirroredRegistrationService {
    pub fn new(directory: Arc<DeviceDirectory>, relay: RelayPushRegistrationService) -> Self {
        Self { directory, relay }
    }
}

#[async_trait]
impl PushRegistrationService for MirroredRegistrationService {
    async fn create_or_update_registration(&self, registration: Registration) -> Result<()> {
        self.relay.ensure_permitted()?;
        self.directory
            .create_or_update_registration(registration.clone())
            .await?;
        self.relay.create_or_update_registration(registration).await
    }

    async fn delete_registration(&self, device: &DeviceKey) -> Result<()> {
        self.relay.ensure_permitted()?;
        self.directory.delete_registration(device).await?;
        self.relay.delete_registration(device).await
    }

    async fn add_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if devices.is_empty() {
            return Ok(());
        }
        self.relay.ensure_permitted()?;
        self.directory
            .add_user_registration_organization(devices, organization_id)
            .await?;
        self.relay
            .add_user_registration_organization(devices, organization_id)
            .await
    }

    async fn delete_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if devices.is_empty() {
            return Ok(());
        }
        self.relay.ensure_permitted()?;
        self.directory
            .delete_user_registration_organization(devices, organization_id)
            .await?;
        self.relay
            .delete_user_registration_organization(devices, organization_id)
            .await
    }
}
