//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CASCADE_FAILURES_TOTAL, DELIVERIES_TOTAL, DELIVERY_FAILURES_TOTAL, PUSHES_SENT_TOTAL,
    REGISTRATION_OPERATIONS_TOTAL, RELAY_REQUESTS_TOTAL, RELAY_REQUEST_LATENCY,
    RELAY_TOKEN_REFRESHES_TOTAL, REMOVALS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct RegistrationMetrics;

impl RegistrationMetrics {
    pub fn record(operation: &str, backend: &str) {
        REGISTRATION_OPERATIONS_TOTAL
            .with_label_values(&[operation, backend])
            .inc();
    }
}

pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_request(operation: &str, outcome: &str, elapsed_secs: f64) {
        RELAY_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
        RELAY_REQUEST_LATENCY
            .with_label_values(&[operation])
            .observe(elapsed_secs);
    }

    pub fn record_token_refresh() {
        RELAY_TOKEN_REFRESHES_TOTAL.inc();
    }
}

pub struct PushMetrics;

impl PushMetrics {
    pub fn record_sent(audience: &str) {
        PUSHES_SENT_TOTAL.with_label_values(&[audience]).inc();
    }

    pub fn record_delivered(count: u64) {
        DELIVERIES_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        DELIVERY_FAILURES_TOTAL.inc_by(count);
    }
}

pub struct RemovalMetrics;

impl RemovalMetrics {
    pub fn record_removed(mode: &str) {
        REMOVALS_TOTAL.with_label_values(&[mode, "removed"]).inc();
    }

    pub fn record_rejected(mode: &str) {
        REMOVALS_TOTAL.with_label_values(&[mode, "rejected"]).inc();
    }

    pub fn record_cascade_failure() {
        CASCADE_FAILURES_TOTAL.inc();
    }
}
