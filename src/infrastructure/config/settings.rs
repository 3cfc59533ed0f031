use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub relay_auth: RelayAuthConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Push hosting and delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Self-hosted instances forward every push operation to the relay
    #[serde(default)]
    pub self_hosted: bool,
    /// Interactive/development mode, relaxes relay usage checks
    #[serde(default)]
    pub development: bool,
    /// Base URI of the shared push relay
    #[serde(default = "default_relay_base_uri")]
    pub relay_base_uri: String,
    #[serde(default)]
    pub installation: InstallationConfig,
    /// Device directory backend: "memory" or "redis"
    #[serde(default = "default_directory_backend")]
    pub directory_backend: String,
    /// Delivery transport: "memory" or "redis"
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Redis channel the push gateways consume deliveries from
    #[serde(default = "default_delivery_channel")]
    pub delivery_channel: String,
    /// Maximum number of concurrent device deliveries per dispatch
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Timeout for relay and identity HTTP calls in seconds
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_seconds: u64,
}

/// Identity of this installation when paired with the shared relay
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationConfig {
    pub id: Option<Uuid>,
    pub key: Option<String>,
    #[serde(default = "default_identity_uri")]
    pub identity_uri: String,
}

/// Verification of installation bearer tokens on the relay ingress
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayAuthConfig {
    #[serde(default)]
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeatureFlags {
    /// Managed members are protected from plain removal
    #[serde(default)]
    pub account_deprovisioning: bool,
}

/// Retry policy for the post-removal cascade
#[derive(Debug, Clone, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_cascade_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_cascade_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_cascade_max_delay")]
    pub max_delay_ms: u64,
}

/// OpenTelemetry exporter settings
#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_relay_base_uri() -> String {
    "http://localhost:8082".to_string()
}

fn default_identity_uri() -> String {
    "http://localhost:33656".to_string()
}

fn default_directory_backend() -> String {
    "memory".to_string()
}

fn default_transport() -> String {
    "memory".to_string()
}

fn default_delivery_channel() -> String {
    "ara:push:deliveries".to_string()
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_relay_timeout() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_prefix() -> String {
    "ara:push".to_string()
}

fn default_cascade_attempts() -> u32 {
    3
}

fn default_cascade_initial_delay() -> u64 {
    100
}

fn default_cascade_max_delay() -> u64 {
    2_000
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-push-relay".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("push.development", run_mode == "development")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ARA_SERVER__PORT, ARA_PUSH__SELF_HOSTED, ARA_PUSH__INSTALLATION__ID, ...
            .add_source(
                Environment::with_prefix("ARA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            self_hosted: false,
            development: false,
            relay_base_uri: default_relay_base_uri(),
            installation: InstallationConfig::default(),
            directory_backend: default_directory_backend(),
            transport: default_transport(),
            delivery_channel: default_delivery_channel(),
            max_concurrent_sends: default_max_concurrent_sends(),
            relay_timeout_seconds: default_relay_timeout(),
        }
    }
}

impl InstallationConfig {
    /// Client id presented to the identity server for relay tokens
    pub fn client_id(&self) -> Option<String> {
        self.id.map(|id| format!("installation.{}", id))
    }
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            id: None,
            key: None,
            identity_uri: default_identity_uri(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_redis_prefix(),
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_cascade_attempts(),
            initial_delay_ms: default_cascade_initial_delay(),
            max_delay_ms: default_cascade_max_delay(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8082);
        assert!(!settings.push.self_hosted);
        assert_eq!(settings.push.directory_backend, "memory");
        assert_eq!(settings.cascade.max_attempts, 3);
        assert!(!settings.features.account_deprovisioning);
    }

    #[test]
    fn test_installation_client_id() {
        let mut settings = Settings::default();
        assert!(settings.push.installation.client_id().is_none());

        let id = Uuid::nil();
        settings.push.installation.id = Some(id);
        assert_eq!(
            settings.push.installation.client_id().as_deref(),
            Some("installation.00000000-0000-0000-0000-000000000000")
        );
    }
}
