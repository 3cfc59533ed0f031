//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `auth`: relay bearer token validation
//! - `backoff`: exponential backoff and retry
//! - `config`: Application configuration and settings
//! - `error`: Unified error types
//! - `metrics`: Prometheus metrics helpers
//! - `redis`: Redis connection pool

pub mod auth;
pub mod backoff;
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
