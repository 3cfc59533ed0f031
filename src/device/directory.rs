use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::{RegistrationMetrics, REGISTERED_DEVICES};
use crate::notification::Audience;

use super::backend::DirectoryBackend;
use super::{Device, DeviceKey, DeviceRepository, PushRegistrationService, Registration};

/// Authoritative mapping of device -> push token -> user -> organizations.
///
/// Used directly in hosted mode. Self-hosted instances keep their own devices
/// here as well and mirror registrations to the relay through
/// [`MirroredRegistrationService`](crate::push::MirroredRegistrationService).
pub struct DeviceDirectory {
    backend: Arc<dyn DirectoryBackend>,
}

impl DeviceDirectory {
    pub fn new(backend: Arc<dyn DirectoryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_type().as_str()
    }

    pub async fn get(&self, key: &DeviceKey) -> Result<Option<Device>> {
        Ok(self.backend.get(key).await?)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.backend.count().await?)
    }

    /// Resolve an audience into the devices currently in it
    pub async fn devices_for(&self, audience: &Audience) -> Result<Vec<Device>> {
        let devices = match audience {
            Audience::Global => self.backend.find_all().await?,
            Audience::User(user_id) => self.backend.find_by_user(user_id).await?,
            Audience::Organization(organization_id) => {
                self.backend.find_by_organization(organization_id).await?
            }
            Audience::Installation(installation_id) => self
                .backend
                .find_all()
                .await?
                .into_iter()
                .filter(|d| d.installation_id.as_deref() == Some(installation_id.as_str()))
                .collect(),
        };
        Ok(devices)
    }

    async fn refresh_gauge(&self) {
        if let Ok(count) = self.backend.count().await {
            REGISTERED_DEVICES.set(count as i64);
        }
    }
}

#[async_trait]
impl PushRegistrationService for DeviceDirectory {
    #[tracing::instrument(
        name = "directory.register",
        skip(self, registration),
        fields(device_id = %registration.device_id, device_type = %registration.device_type)
    )]
    async fn create_or_update_registration(&self, registration: Registration) -> Result<()> {
        let device = registration.into_device();
        let has_token = device.has_push_token();

        self.backend.upsert(device).await?;
        RegistrationMetrics::record("register", self.backend_name());
        self.refresh_gauge().await;

        tracing::debug!(has_token = has_token, "Device registration stored");
        Ok(())
    }

    #[tracing::instrument(
        name = "directory.deregister",
        skip(self, device),
        fields(device_id = %device.device_id, device_type = %device.device_type)
    )]
    async fn delete_registration(&self, device: &DeviceKey) -> Result<()> {
        let existed = self.backend.remove(device).await?;
        RegistrationMetrics::record("delete", self.backend_name());
        self.refresh_gauge().await;

        if !existed {
            tracing::debug!("Deregistration of unknown device ignored");
        }
        Ok(())
    }

    #[tracing::instrument(
        name = "directory.add_organization",
        skip(self, devices),
        fields(organization_id = %organization_id, device_count = devices.len())
    )]
    async fn add_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if devices.is_empty() {
            return Ok(());
        }

        let updated = self.backend.add_organization(devices, organization_id).await?;
        RegistrationMetrics::record("add_organization", self.backend_name());

        tracing::debug!(updated = updated, "Devices entitled to organization pushes");
        Ok(())
    }

    #[tracing::instrument(
        name = "directory.delete_organization",
        skip(self, devices),
        fields(organization_id = %organization_id, device_count = devices.len())
    )]
    async fn delete_user_registration_organization(
        &self,
        devices: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if devices.is_empty() {
            return Ok(());
        }

        let updated = self
            .backend
            .remove_organization(devices, organization_id)
            .await?;
        RegistrationMetrics::record("delete_organization", self.backend_name());

        tracing::debug!(updated = updated, "Organization revoked from devices");
        Ok(())
    }
}

#[async_trait]
impl DeviceRepository for DeviceDirectory {
    async fn get_many_by_user_id(&self, user_id: Uuid) -> Result<Vec<Device>> {
        Ok(self.backend.find_by_user(&user_id.to_string()).await?)
    }
}
