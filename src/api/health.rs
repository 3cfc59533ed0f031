use axum::{extract::State, Json};
use serde::Serialize;

use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub hosting_mode: String,
    pub directory: DirectoryHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct DirectoryHealthResponse {
    pub backend: String,
    pub devices: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub devices: Option<usize>,
    pub notifications: DispatcherStatsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let devices = state.directory.count().await.ok();

    let redis = match state.redis_pool {
        Some(ref pool) => Some(RedisHealthResponse {
            connected: pool.ping().await.is_ok(),
        }),
        None => None,
    };

    let healthy = devices.is_some() && redis.as_ref().map_or(true, |r| r.connected);
    let status = if healthy { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        hosting_mode: state.push.mode.as_str().to_string(),
        directory: DirectoryHealthResponse {
            backend: state.directory.backend_name().to_string(),
            devices,
        },
        redis,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        devices: state.directory.count().await.ok(),
        notifications: state.dispatcher.stats(),
    })
}
