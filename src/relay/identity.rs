//! Client-credentials exchange against the identity server.

use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::PUSH_SCOPE;
use crate::error::{AppError, Result};
use crate::metrics::RelayMetrics;

/// Tokens are refreshed this long before they expire
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Upper bound on the lifetime trusted from a token response
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_SKEW < self.expires_at
    }
}

/// Obtains and caches the installation's access token for the relay
pub struct AccessTokenProvider {
    http_client: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(
        http_client: HttpClient,
        identity_uri: &str,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http_client,
            token_url: format!("{}/connect/token", identity_uri.trim_end_matches('/')),
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    /// Current access token, fetching a new one if none is cached or the
    /// cached one is about to expire
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[tracing::instrument(name = "relay.token", skip(self), fields(client_id = %self.client_id))]
    async fn request_token(&self) -> Result<CachedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("scope", PUSH_SCOPE),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("identity server unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Identity server refused relay token");
            return Err(AppError::Auth(format!(
                "identity server returned {}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("invalid token response: {}", e)))?;

        RelayMetrics::record_token_refresh();
        tracing::debug!(expires_in = body.expires_in, "Relay token acquired");

        Ok(CachedToken {
            value: body.access_token,
            expires_at: expires_at(Instant::now(), body.expires_in),
        })
    }
}

fn expires_at(now: Instant, expires_in: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in).min(MAX_TOKEN_LIFETIME);
    now.checked_add(lifetime).unwrap_or(now)
}
