//! Relay to the shared push backend used by self-hosted installations.
//!
//! Every id crossing the relay is namespaced as `"{installationId}_{id}"`.
//! Calls are authenticated with an installation token obtained through the
//! client-credentials exchange, scoped to `api.push`.

mod client;
mod identity;
mod models;
mod notification;
mod prefix;
mod registration;
mod usage;

pub use client::RelayClient;
pub use identity::AccessTokenProvider;
pub use models::{PushDeviceRequest, PushRegistrationRequest, PushSendRequest, PushUpdateRequest};
pub use notification::RelayPushNotificationService;
pub use prefix::InstallationPrefix;
pub use registration::RelayPushRegistrationService;
pub use usage::RelayGate;
