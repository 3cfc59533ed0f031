//! In-memory device directory backend using DashMap.
//!
//! Registrations are lost on restart; intended for development, tests and
//! single-node deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{DirectoryBackend, DirectoryBackendType, DirectoryError};
use super::{Device, DeviceKey};

#[derive(Default)]
pub struct MemoryDirectoryBackend {
    devices: DashMap<DeviceKey, Device>,
}

impl MemoryDirectoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, predicate: F) -> Vec<Device>
    where
        F: Fn(&Device) -> bool,
    {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by(|a, b| a.key().cmp(&b.key()));
        devices
    }
}

#[async_trait]
impl DirectoryBackend for MemoryDirectoryBackend {
    fn backend_type(&self) -> DirectoryBackendType {
        DirectoryBackendType::Memory
    }

    async fn upsert(&self, device: Device) -> Result<(), DirectoryError> {
        self.devices.insert(device.key(), device);
        Ok(())
    }

    async fn remove(&self, key: &DeviceKey) -> Result<bool, DirectoryError> {
        Ok(self.devices.remove(key).is_some())
    }

    async fn get(&self, key: &DeviceKey) -> Result<Option<Device>, DirectoryError> {
        Ok(self.devices.get(key).map(|d| d.value().clone()))
    }

    async fn add_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError> {
        let mut updated = 0;
        for key in keys {
            if let Some(mut device) = self.devices.get_mut(key) {
                if device.organization_ids.insert(organization_id.to_string()) {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn remove_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError> {
        let mut updated = 0;
        for key in keys {
            if let Some(mut device) = self.devices.get_mut(key) {
                if device.organization_ids.remove(organization_id) {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn find_all(&self) -> Result<Vec<Device>, DirectoryError> {
        Ok(self.collect(|_| true))
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Device>, DirectoryError> {
        Ok(self.collect(|d| d.user_id == user_id))
    }

    async fn find_by_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Device>, DirectoryError> {
        Ok(self.collect(|d| d.organization_ids.contains(organization_id)))
    }

    async fn count(&self) -> Result<usize, DirectoryError> {
        Ok(self.devices.len())
    }
}
