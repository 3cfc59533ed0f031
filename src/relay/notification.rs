use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use crate::device::ClientType;
use crate::error::Result;
use crate::metrics::PushMetrics;
use crate::notification::{Audience, PushNotification, PushNotificationService};

use super::{PushSendRequest, RelayClient};

/// Sends pushes through the shared relay, which resolves the audience on its side
pub struct RelayPushNotificationService {
    client: Arc<RelayClient>,
}

impl RelayPushNotificationService {
    pub fn new(client: Arc<RelayClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushNotificationService for RelayPushNotificationService {
    #[tracing::instrument(
        name = "relay.push",
        skip(self, notification),
        fields(audience = audience.label(), push_type = %notification.push_type)
    )]
    async fn send(&self, audience: Audience, notification: PushNotification) -> Result<()> {
        let prefix = self.client.prefix()?;
        let (global, user_id, organization_id) = match &audience {
            // The relay scopes global pushes to the calling installation
            Audience::Global | Audience::Installation(_) => (true, None, None),
            Audience::User(id) => (false, Some(prefix.apply_required(id, "userId")?), None),
            Audience::Organization(id) => (
                false,
                None,
                Some(prefix.apply_required(id, "organizationId")?),
            ),
        };

        let request = PushSendRequest {
            push_type: notification.push_type,
            payload: notification.payload,
            user_id,
            organization_id,
            device_id: prefix.apply_opt(notification.exclude_device_id.as_deref()),
            identifier: prefix.apply_opt(notification.identifier.as_deref()),
            client_type: match notification.client_type {
                ClientType::All => None,
                other => Some(other),
            },
            global,
        };

        self.client.send(Method::POST, "push/send", &request).await?;
        PushMetrics::record_sent(audience.label());
        Ok(())
    }
}
