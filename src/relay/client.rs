//! Authenticated HTTP client for the shared relay.

use std::time::{Duration, Instant};

use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Serialize;

use crate::config::PushConfig;
use crate::error::{AppError, Result};
use crate::metrics::RelayMetrics;

use super::{AccessTokenProvider, InstallationPrefix, RelayGate};

pub struct RelayClient {
    http_client: HttpClient,
    base_uri: String,
    gate: RelayGate,
    tokens: Option<AccessTokenProvider>,
}

impl RelayClient {
    pub fn new(config: &PushConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.relay_timeout_seconds))
            .pool_max_idle_per_host(10)
            .build()?;

        let installation = &config.installation;
        let tokens = match (installation.client_id(), installation.key.as_ref()) {
            (Some(client_id), Some(key)) => Some(AccessTokenProvider::new(
                http_client.clone(),
                &installation.identity_uri,
                client_id,
                key.clone(),
            )),
            _ => None,
        };

        Ok(Self {
            http_client,
            base_uri: config.relay_base_uri.trim_end_matches('/').to_string(),
            gate: RelayGate::from_config(config),
            tokens,
        })
    }

    /// Prefix for outbound ids; fails if the relay may not be used
    pub fn prefix(&self) -> Result<InstallationPrefix> {
        self.gate.check_outbound()
    }

    /// Send one relay request. Retries once with a fresh token after a 401.
    #[tracing::instrument(name = "relay.send", skip(self, body), fields(method = %method, path = %path))]
    pub async fn send<B>(&self, method: Method, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + Sync,
    {
        self.gate.check_outbound()?;
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            AppError::Configuration("Installation id and key are required for push relays.".into())
        })?;

        let start = Instant::now();
        let result = async {
            let token = tokens.access_token().await?;
            let status = self.execute(method.clone(), path, body, &token).await?;
            if status != StatusCode::UNAUTHORIZED {
                return Ok(status);
            }

            tracing::debug!("Relay rejected token, refreshing");
            tokens.invalidate().await;
            let token = tokens.access_token().await?;
            self.execute(method.clone(), path, body, &token).await
        }
        .await;

        let elapsed = start.elapsed().as_secs_f64();
        match result {
            Ok(status) if status.is_success() => {
                RelayMetrics::record_request(path, "success", elapsed);
                Ok(())
            }
            Ok(status) => {
                RelayMetrics::record_request(path, "rejected", elapsed);
                tracing::warn!(status = status.as_u16(), "Relay request rejected");
                Err(AppError::Delivery(format!(
                    "relay returned {} for {}",
                    status.as_u16(),
                    path
                )))
            }
            Err(e) => {
                RelayMetrics::record_request(path, "error", elapsed);
                tracing::warn!(error = %e, "Relay request failed");
                Err(e)
            }
        }
    }

    async fn execute<B>(&self, method: Method, path: &str, body: &B, token: &str) -> Result<StatusCode>
    where
        B: Serialize + Sync,
    {
        let url = format!("{}/{}", self.base_uri, path);
        let response = self
            .http_client
            .request(method, &url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("relay unreachable: {}", e)))?;

        Ok(response.status())
    }
}
