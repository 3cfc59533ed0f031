//! Prometheus metrics for the push relay service.
//!
//! - Registration metrics (register, deregister, organization updates)
//! - Relay metrics (outbound requests, token refreshes)
//! - Push metrics (sent by audience, delivered, failed)
//! - Removal metrics (outcomes, cascade failures)

mod helpers;

pub use helpers::{encode_metrics, PushMetrics, RegistrationMetrics, RelayMetrics, RemovalMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_push";

lazy_static! {
    // ============================================================================
    // Registration Metrics
    // ============================================================================

    /// Registration operations by kind (register, delete, add_org, delete_org)
    pub static ref REGISTRATION_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_registration_operations_total", METRIC_PREFIX),
        "Total device registration operations",
        &["operation", "backend"]
    ).unwrap();

    /// Devices currently registered in the local directory
    pub static ref REGISTERED_DEVICES: IntGauge = register_int_gauge!(
        format!("{}_registered_devices", METRIC_PREFIX),
        "Number of devices in the local directory"
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Outbound relay requests by operation and outcome
    pub static ref RELAY_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_relay_requests_total", METRIC_PREFIX),
        "Total requests sent to the push relay",
        &["operation", "outcome"]
    ).unwrap();

    /// Relay request latency
    pub static ref RELAY_REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_relay_request_latency_seconds", METRIC_PREFIX),
        "Push relay request latency in seconds",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Access token exchanges with the identity server
    pub static ref RELAY_TOKEN_REFRESHES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_token_refreshes_total", METRIC_PREFIX),
        "Total relay access token exchanges"
    ).unwrap();

    // ============================================================================
    // Push Metrics
    // ============================================================================

    /// Pushes dispatched by audience (global, user, organization)
    pub static ref PUSHES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pushes_sent_total", METRIC_PREFIX),
        "Total pushes dispatched",
        &["audience"]
    ).unwrap();

    /// Device deliveries that reached the push channel
    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total device deliveries"
    ).unwrap();

    /// Device deliveries that failed
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Total failed device deliveries"
    ).unwrap();

    // ============================================================================
    // Removal Metrics
    // ============================================================================

    /// Membership removals by outcome (removed, rejected)
    pub static ref REMOVALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_membership_removals_total", METRIC_PREFIX),
        "Total organization membership removals",
        &["mode", "outcome"]
    ).unwrap();

    /// Cascades that could not complete after retries
    pub static ref CASCADE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_cascade_failures_total", METRIC_PREFIX),
        "Total removal cascades left incomplete"
    ).unwrap();
}
