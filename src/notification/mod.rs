//! Push notification types and dispatching.
//!
//! # Transport Architecture
//!
//! The dispatcher resolves an [`Audience`] through the device directory and
//! hands each eligible device to a [`PushTransport`]:
//!
//! - `MemoryPushTransport`: records deliveries in memory (default)
//! - `RedisPushTransport`: publishes deliveries for the platform gateways
//!
//! Use `create_push_transport()` to pick one from configuration.

mod dispatcher;
mod service;
mod transport;
mod types;

pub use dispatcher::{
    DeliveryResult, DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher,
};
pub use service::PushNotificationService;
pub use transport::{
    create_push_transport, DeliveryRecord, MemoryPushTransport, PushTransport,
    RedisPushTransport, TransportError,
};
pub use types::{Audience, PushMessage, PushNotification, PushType};
