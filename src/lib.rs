// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules at the crate root
pub use infrastructure::auth;
pub use infrastructure::backoff;
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;

// Domain layer (business logic)
pub mod device;
pub mod membership;
pub mod notification;
pub mod push;
pub mod relay;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
