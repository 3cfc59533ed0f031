use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use crate::device::{DeviceKey, PushRegistrationService, Registration};
use crate::error::Result;
use crate::metrics::RegistrationMetrics;

use super::{
    InstallationPrefix, PushDeviceRequest, PushRegistrationRequest, PushUpdateRequest,
    RelayClient,
};

/// Forwards directory mutations to the shared relay, namespaced by installation
pub struct RelayPushRegistrationService {
    client: Arc<RelayClient>,
}

impl RelayPushRegistrationService {
    pub fn new(client: Arc<RelayClient>) -> Self {
        Self { client }
    }

    /// Fails with the relay configuration error if this instance may not
    /// use the relay
    pub fn ensure_permitted(&self) -> Result<()> {
        self.client.prefix().map(|_| ())
    }

    fn update_request(
        prefix: &InstallationPrefix,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<PushUpdateRequest> {
        let devices = keys
            .iter()
            .map(|key| {
                Ok(PushDeviceRequest {
                    id: prefix.apply_required(&key.device_id, "deviceId")?,
                    device_type: key.device_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PushUpdateRequest {
            devices,
            organization_id: prefix.apply_required(organization_id, "organizationId")?,
        })
    }
}

#[async_trait]
impl PushRegistrationService for RelayPushRegistrationService {
    #[tracing::instrument(
        name = "relay.register",
        skip(self, registration),
        fields(device_type = %registration.device_type)
    )]
    async fn create_or_update_registration(&self, registration: Registration) -> Result<()> {
        let prefix = self.client.prefix()?;
        let request = PushRegistrationRequest {
            push_token: registration.push_token,
            device_id: prefix.apply_required(&registration.device_id, "deviceId")?,
            user_id: prefix.apply_required(&registration.user_id, "userId")?,
            identifier: prefix.apply_opt(registration.identifier.as_deref()),
            device_type: registration.device_type,
            installation_id: registration
                .installation_id
                .or_else(|| Some(prefix.installation_id().to_string())),
            organization_ids: registration
                .organization_ids
                .iter()
                .filter_map(|id| prefix.apply(id))
                .collect(),
        };

        self.client
            .send(Method::POST, "push/register", &request)
            .await?;
        RegistrationMetrics::record("register", "relay");
        Ok(())
    }

    #[tracing::instrument(name = "relay.deregister", skip(self), fields(device = %key))]
    async fn delete_registration(&self, key: &DeviceKey) -> Result<()> {
        let prefix = self.client.prefix()?;
        let request = PushDeviceRequest {
            id: prefix.apply_required(&key.device_id, "deviceId")?,
            device_type: key.device_type,
        };

        self.client.send(Method::POST, "push/delete", &request).await?;
        RegistrationMetrics::record("deregister", "relay");
        Ok(())
    }

    #[tracing::instrument(
        name = "relay.add_organization",
        skip(self, keys),
        fields(organization_id = %organization_id, device_count = keys.len())
    )]
    async fn add_user_registration_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let prefix = self.client.prefix()?;
        let request = Self::update_request(&prefix, keys, organization_id)?;
        self.client
            .send(Method::PUT, "push/add-organization", &request)
            .await?;
        RegistrationMetrics::record("add_organization", "relay");
        Ok(())
    }

    #[tracing::instrument(
        name = "relay.delete_organization",
        skip(self, keys),
        fields(organization_id = %organization_id, device_count = keys.len())
    )]
    async fn delete_user_registration_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let prefix = self.client.prefix()?;
        let request = Self::update_request(&prefix, keys, organization_id)?;
        self.client
            .send(Method::PUT, "push/delete-organization", &request)
            .await?;
        RegistrationMetrics::record("delete_organization", "relay");
        Ok(())
    }
}
