//! Capability interface for sending pushes.

use async_trait::async_trait;

use crate::error::Result;

use super::{Audience, PushNotification};

/// Sends typed pushes to an audience. Implemented by the local
/// [`NotificationDispatcher`](super::NotificationDispatcher) in hosted mode
/// and by the relay client in self-hosted mode.
///
/// Delivery is best effort: failures reaching individual devices are logged,
/// not returned. An `Err` means the push could not be handed off at all.
#[async_trait]
pub trait PushNotificationService: Send + Sync {
    async fn send(&self, audience: Audience, notification: PushNotification) -> Result<()>;

    async fn send_to_everyone(&self, notification: PushNotification) -> Result<()> {
        self.send(Audience::Global, notification).await
    }

    async fn send_to_user(&self, user_id: &str, notification: PushNotification) -> Result<()> {
        self.send(Audience::User(user_id.to_string()), notification)
            .await
    }

    async fn send_to_organization(
        &self,
        organization_id: &str,
        notification: PushNotification,
    ) -> Result<()> {
        self.send(Audience::Organization(organization_id.to_string()), notification)
            .await
    }

    /// Ask the user's devices to resync their organization keys
    async fn push_sync_org_keys(&self, user_id: &str) -> Result<()> {
        self.send_to_user(user_id, PushNotification::sync_org_keys(user_id))
            .await
    }
}
