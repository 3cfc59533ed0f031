mod settings;

pub use settings::{
    CascadeConfig, FeatureFlags, InstallationConfig, OtelConfig, PushConfig, RedisConfig,
    RelayAuthConfig, ServerConfig, Settings,
};
