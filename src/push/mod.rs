//! Capability selection between the local directory and the shared relay.

mod mirror;

use std::sync::Arc;

use uuid::Uuid;

use crate::config::PushConfig;
use crate::device::{DeviceDirectory, PushRegistrationService};
use crate::error::Result;
use crate::notification::{NotificationDispatcher, PushNotificationService};
use crate::relay::{RelayClient, RelayPushNotificationService, RelayPushRegistrationService};

pub use mirror::MirroredRegistrationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingMode {
    /// Devices are registered and reached through this instance
    Hosted,
    /// Registrations and pushes go through the shared relay
    SelfHosted { installation_id: Option<Uuid> },
}

impl HostingMode {
    pub fn from_config(config: &PushConfig) -> Self {
        if config.self_hosted {
            HostingMode::SelfHosted {
                installation_id: config.installation.id,
            }
        } else {
            HostingMode::Hosted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostingMode::Hosted => "hosted",
            HostingMode::SelfHosted { .. } => "self_hosted",
        }
    }
}

/// The registration and notification capabilities for this instance
#[derive(Clone)]
pub struct PushServices {
    pub mode: HostingMode,
    pub registration: Arc<dyn PushRegistrationService>,
    pub notifications: Arc<dyn PushNotificationService>,
}

/// Pick the push capabilities for the configured hosting mode
pub fn create_push_services(
    config: &PushConfig,
    directory: Arc<DeviceDirectory>,
    dispatcher: Arc<NotificationDispatcher>,
) -> Result<PushServices> {
    let mode = HostingMode::from_config(config);

    match mode {
        HostingMode::Hosted => {
            tracing::info!(mode = mode.as_str(), "Using local device directory");
            Ok(PushServices {
                mode,
                registration: directory,
                notifications: dispatcher,
            })
        }
        HostingMode::SelfHosted { installation_id } => {
            if installation_id.is_none() {
                tracing::warn!(
                    "Self-hosted without an installation id, relay calls will be refused"
                );
            } else {
                tracing::info!(
                    mode = mode.as_str(),
                    relay = %config.relay_base_uri,
                    "Using push relay"
                );
            }

            let client = Arc::new(RelayClient::new(config)?);
            Ok(PushServices {
                mode,
                registration: Arc::new(MirroredRegistrationService::new(
                    directory,
                    RelayPushRegistrationService::new(client.clone()),
                )),
                notifications: Arc::new(RelayPushNotificationService::new(client)),
            })
        }
    }
}
