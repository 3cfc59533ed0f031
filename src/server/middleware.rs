use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::error::AppError;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Installation bearer authentication for the relay ingress.
/// Inserts the [`InstallationCaller`](crate::auth::InstallationCaller) into
/// the request extensions.
pub async fn relay_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = extract_bearer_token(&req) else {
        tracing::warn!("Missing relay bearer token");
        return Err(AppError::Auth("Missing bearer token".to_string()));
    };

    let caller = state.token_validator.authenticate(token).map_err(|e| {
        tracing::warn!(error = %e, "Rejected relay bearer token");
        e
    })?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
