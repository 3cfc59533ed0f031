//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod push;
mod routes;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use push::{add_organization, delete_organization, delete_registration, register, send};
pub use routes::api_routes;
