//! Storage abstraction behind the device directory.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;

use super::{Device, DeviceKey};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt directory entry: {0}")]
    Corrupt(String),

    #[error("Concurrent update conflict: {0}")]
    Contended(String),
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Redis(e) => AppError::Redis(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Backend type for the device directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryBackendType {
    Memory,
    Redis,
}

impl DirectoryBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryBackendType::Memory => "memory",
            DirectoryBackendType::Redis => "redis",
        }
    }
}

/// Persistent device-registration storage
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    fn backend_type(&self) -> DirectoryBackendType;

    /// Insert or replace the device stored under its key
    async fn upsert(&self, device: Device) -> Result<(), DirectoryError>;

    /// Remove a device. Returns whether it existed.
    async fn remove(&self, key: &DeviceKey) -> Result<bool, DirectoryError>;

    async fn get(&self, key: &DeviceKey) -> Result<Option<Device>, DirectoryError>;

    /// Add the organization to every listed device that exists. Returns the number updated.
    async fn add_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError>;

    /// Remove the organization from every listed device. Returns the number updated.
    async fn remove_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError>;

    async fn find_all(&self) -> Result<Vec<Device>, DirectoryError>;

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Device>, DirectoryError>;

    async fn find_by_organization(&self, organization_id: &str)
        -> Result<Vec<Device>, DirectoryError>;

    async fn count(&self) -> Result<usize, DirectoryError>;
}
