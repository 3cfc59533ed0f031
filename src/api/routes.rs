use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::server::{relay_auth, AppState};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::push::{add_organization, delete_organization, delete_registration, register, send};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Relay ingress, installation bearer tokens only
        .nest(
            "/push",
            Router::new()
                .route("/register", post(register))
                .route("/delete", post(delete_registration))
                .route("/add-organization", put(add_organization))
                .route("/delete-organization", put(delete_organization))
                .route("/send", post(send))
                .route_layer(middleware::from_fn_with_state(state, relay_auth)),
        )
}
