//! Push channel abstraction.
//!
//! The platform gateways (APNs, FCM, web push) sit behind the transport; this
//! service only hands each device its envelope.
//!
//! - `RedisPushTransport`: publishes deliveries on a Redis channel consumed by the gateways
//! - `MemoryPushTransport`: records deliveries in memory (development and tests)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashSet;
use serde::Serialize;
use thiserror::Error;

use crate::config::PushConfig;
use crate::device::{Device, DeviceType};
use crate::redis::RedisPool;

use super::PushMessage;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device has no push token")]
    MissingToken,

    #[error("push channel rejected delivery: {0}")]
    Rejected(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, device: &Device, message: &PushMessage) -> Result<(), TransportError>;
}

/// Wire format published for the push gateways
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayDelivery<'a> {
    push_token: &'a str,
    device_id: &'a str,
    device_type: DeviceType,
    message: &'a PushMessage,
}

pub struct RedisPushTransport {
    pool: Arc<RedisPool>,
    channel: String,
}

impl RedisPushTransport {
    pub fn new(pool: Arc<RedisPool>, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl PushTransport for RedisPushTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn deliver(&self, device: &Device, message: &PushMessage) -> Result<(), TransportError> {
        let token = device
            .push_token
            .as_deref()
            .ok_or(TransportError::MissingToken)?;
        let body = serde_json::to_string(&GatewayDelivery {
            push_token: token,
            device_id: &device.id,
            device_type: device.device_type,
            message,
        })?;

        let mut conn = self.pool.get_connection().await?;
        let result: Result<(), redis::RedisError> = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(body)
            .query_async(&mut conn)
            .await;
        if let Err(ref e) = result {
            self.pool.reset_on_error(e).await;
        }
        Ok(result?)
    }
}

/// A delivery captured by [`MemoryPushTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub device_id: String,
    pub device_type: DeviceType,
    pub push_token: String,
    pub message: PushMessage,
}

#[derive(Default)]
pub struct MemoryPushTransport {
    deliveries: Mutex<Vec<DeliveryRecord>>,
    unreachable_tokens: DashSet<String>,
}

impl MemoryPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to this token fail
    pub fn mark_unreachable(&self, push_token: impl Into<String>) {
        self.unreachable_tokens.insert(push_token.into());
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.clear();
        }
    }
}

#[async_trait]
impl PushTransport for MemoryPushTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn deliver(&self, device: &Device, message: &PushMessage) -> Result<(), TransportError> {
        let token = device
            .push_token
            .clone()
            .ok_or(TransportError::MissingToken)?;
        if self.unreachable_tokens.contains(&token) {
            return Err(TransportError::Rejected(format!(
                "token for device {} is unreachable",
                device.id
            )));
        }

        let record = DeliveryRecord {
            device_id: device.id.clone(),
            device_type: device.device_type,
            push_token: token,
            message: message.clone(),
        };
        self.deliveries
            .lock()
            .map_err(|_| TransportError::Rejected("delivery log poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Create a push transport based on configuration.
///
/// - `"redis"`: `RedisPushTransport` if a Redis pool is provided
/// - `"memory"` (default): `MemoryPushTransport`
pub fn create_push_transport(
    config: &PushConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn PushTransport> {
    match config.transport.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    transport = "redis",
                    channel = %config.delivery_channel,
                    "Creating Redis push transport"
                );
                Arc::new(RedisPushTransport::new(pool, config.delivery_channel.clone()))
            } else {
                tracing::warn!(
                    "Redis push transport requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryPushTransport::new())
            }
        }
        _ => {
            tracing::info!(transport = "memory", "Creating memory push transport");
            Arc::new(MemoryPushTransport::new())
        }
    }
}
