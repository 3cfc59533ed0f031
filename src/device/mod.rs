//! Device registration directory.
//!
//! # Backend Architecture
//!
//! - `MemoryDirectoryBackend`: in-memory storage using DashMap (default)
//! - `RedisDirectoryBackend`: hashes and sets in Redis
//!
//! Use `create_directory_backend()` to pick one from configuration.

mod backend;
mod directory;
mod memory_backend;
mod redis_backend;
mod registration;
mod types;

use std::sync::Arc;

use crate::config::PushConfig;
use crate::redis::RedisPool;

pub use backend::{DirectoryBackend, DirectoryBackendType, DirectoryError};
pub use directory::DeviceDirectory;
pub use memory_backend::MemoryDirectoryBackend;
pub use redis_backend::RedisDirectoryBackend;
pub use registration::{DeviceRepository, PushRegistrationService};
pub use types::{ClientType, Device, DeviceKey, DeviceType, Registration};

/// Create a directory backend based on configuration.
///
/// - `"redis"`: `RedisDirectoryBackend` if a Redis pool is provided
/// - `"memory"` (default): `MemoryDirectoryBackend`
pub fn create_directory_backend(
    config: &PushConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn DirectoryBackend> {
    match config.directory_backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(backend = "redis", "Creating Redis device directory");
                Arc::new(RedisDirectoryBackend::new(pool))
            } else {
                tracing::warn!(
                    "Redis directory backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryDirectoryBackend::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory device directory");
            Arc::new(MemoryDirectoryBackend::new())
        }
    }
}
