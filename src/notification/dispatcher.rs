use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::device::{Device, DeviceDirectory};
use crate::error::Result;
use crate::metrics::PushMetrics;

use super::{Audience, PushMessage, PushNotification, PushNotificationService, PushTransport};

/// Default maximum number of concurrent device deliveries
const DEFAULT_MAX_CONCURRENT_SENDS: usize = 100;

/// Result of a dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Devices the audience resolved to after filtering
    pub targeted: usize,
    /// Devices the push channel accepted
    pub delivered: usize,
    /// Devices that could not be reached
    pub failed: usize,
}

impl DeliveryResult {
    pub fn success(&self) -> bool {
        self.delivered > 0
    }
}

#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_sent: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub global_pushes: AtomicU64,
    pub user_pushes: AtomicU64,
    pub organization_pushes: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            global_pushes: self.global_pushes.load(Ordering::Relaxed),
            user_pushes: self.user_pushes.load(Ordering::Relaxed),
            organization_pushes: self.organization_pushes.load(Ordering::Relaxed),
        }
    }

    fn record(&self, audience: &Audience, result: &DeliveryResult) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
        self.total_delivered
            .fetch_add(result.delivered as u64, Ordering::Relaxed);
        self.total_failed
            .fetch_add(result.failed as u64, Ordering::Relaxed);
        let counter = match audience {
            Audience::Global | Audience::Installation(_) => &self.global_pushes,
            Audience::User(_) => &self.user_pushes,
            Audience::Organization(_) => &self.organization_pushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub global_pushes: u64,
    pub user_pushes: u64,
    pub organization_pushes: u64,
}

/// Resolves audiences through the device directory and delivers to every
/// resolved device. Best effort: per-device failures are logged and counted.
pub struct NotificationDispatcher {
    directory: Arc<DeviceDirectory>,
    transport: Arc<dyn PushTransport>,
    max_concurrent_sends: usize,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(directory: Arc<DeviceDirectory>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            directory,
            transport,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            stats: DispatcherStats::default(),
        }
    }

    pub fn with_max_concurrent_sends(mut self, max: usize) -> Self {
        self.max_concurrent_sends = max.max(1);
        self
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve the audience and deliver to every eligible device
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, notification),
        fields(audience = audience.label(), push_type = %notification.push_type)
    )]
    pub async fn dispatch(
        &self,
        audience: Audience,
        notification: PushNotification,
    ) -> Result<DeliveryResult> {
        let devices = self.directory.devices_for(&audience).await?;
        let targets: Vec<Device> = devices
            .into_iter()
            .filter(|device| is_target(device, &notification))
            .collect();

        let message = PushMessage::from(&notification);
        let (delivered, failed) = self.send_to_devices(&targets, &message).await;
        let result = DeliveryResult {
            targeted: targets.len(),
            delivered,
            failed,
        };

        self.stats.record(&audience, &result);
        PushMetrics::record_sent(audience.label());
        PushMetrics::record_delivered(delivered as u64);
        PushMetrics::record_failed(failed as u64);

        if failed > 0 {
            tracing::warn!(
                targeted = result.targeted,
                delivered = delivered,
                failed = failed,
                "Push partially delivered"
            );
        } else {
            tracing::debug!(
                targeted = result.targeted,
                delivered = delivered,
                "Push delivered"
            );
        }

        Ok(result)
    }

    /// Deliver to devices concurrently with bounded parallelism
    async fn send_to_devices(&self, devices: &[Device], message: &PushMessage) -> (usize, usize) {
        if devices.is_empty() {
            return (0, 0);
        }

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;

        let mut tally = |result: std::result::Result<(), (String, String)>| match result {
            Ok(()) => delivered += 1,
            Err((device_id, error)) => {
                failed += 1;
                tracing::warn!(
                    device_id = %device_id,
                    transport = self.transport.name(),
                    error = %error,
                    "Push delivery failed"
                );
            }
        };

        for device in devices {
            let transport = self.transport.clone();
            futures.push(async move {
                transport
                    .deliver(device, message)
                    .await
                    .map_err(|e| (device.id.clone(), e.to_string()))
            });

            // Process completed futures when we hit the concurrency limit
            while futures.len() >= self.max_concurrent_sends {
                match futures.next().await {
                    Some(result) => tally(result),
                    None => break,
                }
            }
        }

        while let Some(result) = futures.next().await {
            tally(result);
        }

        (delivered, failed)
    }
}

/// Whether the device should receive this push
fn is_target(device: &Device, notification: &PushNotification) -> bool {
    if !device.has_push_token() {
        return false;
    }
    if !notification.client_type.matches(device.device_type) {
        return false;
    }
    match notification.exclude_device_id.as_deref() {
        Some(excluded) => device.id != excluded,
        None => true,
    }
}

#[async_trait]
impl PushNotificationService for NotificationDispatcher {
    async fn send(&self, audience: Audience, notification: PushNotification) -> Result<()> {
        self.dispatch(audience, notification).await.map(|_| ())
    }
}
