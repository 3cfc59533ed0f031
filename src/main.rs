use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use ara_push_relay::config::Settings;
use ara_push_relay::redis::RedisPool;
use ara_push_relay::server::{create_app, AppState};
use ara_push_relay::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing; keep the guard alive until shutdown
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Redis is only needed by the redis-backed directory and transport
    let needs_redis =
        settings.push.directory_backend == "redis" || settings.push.transport == "redis";
    let redis_pool = if needs_redis {
        let pool = Arc::new(RedisPool::new(&settings.redis)?);
        match pool.ping().await {
            Ok(()) => tracing::info!("Redis connection established"),
            Err(e) => tracing::warn!(error = %e, "Redis not reachable yet, will retry lazily"),
        }
        Some(pool)
    } else {
        None
    };

    // Create application state
    let state = AppState::new(settings.clone(), redis_pool)?;
    tracing::info!(
        hosting_mode = state.push.mode.as_str(),
        directory = state.directory.backend_name(),
        "Application state initialized"
    );

    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
