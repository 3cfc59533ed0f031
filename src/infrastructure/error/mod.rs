use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned whenever the push relay is used outside a permitted hosting mode
pub const RELAY_NOT_CONFIGURED: &str = "Not correctly configured for push relays.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Relay used while the hosting mode does not permit it. Never retried.
    #[error("{0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// An organizational invariant rejected the request
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The relay or push channel could not be reached
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub fn relay_not_configured() -> Self {
        AppError::Configuration(RELAY_NOT_CONFIGURED.to_string())
    }

    /// Whether repeating the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Delivery(_) | AppError::Redis(_) | AppError::Http(_) | AppError::Internal(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

/// Hide server-side details from clients in production
fn redacted(detail: String, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        detail
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let log_message = self.to_string();
        let (status, code, client_message) = match self {
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                redacted(e.to_string(), "Configuration error"),
            ),
            AppError::Configuration(msg) => (StatusCode::BAD_REQUEST, "RELAY_NOT_CONFIGURED", msg),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Delivery(msg) => (
                StatusCode::BAD_GATEWAY,
                "DELIVERY_FAILED",
                redacted(msg, "Push delivery failed"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                redacted(msg, "Internal server error"),
            ),
            AppError::Redis(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "REDIS_ERROR",
                redacted(e.to_string(), "Service temporarily unavailable"),
            ),
            AppError::Http(e) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                redacted(e.to_string(), "Upstream service unavailable"),
            ),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
