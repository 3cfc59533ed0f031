use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::RelayAuthConfig;
use crate::error::AppError;

use super::{InstallationCaller, RelayClaims, PUSH_SCOPE};

/// Validates installation bearer tokens presented to the relay ingress
pub struct RelayTokenValidator {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl RelayTokenValidator {
    pub fn new(config: &RelayAuthConfig) -> Self {
        // An empty secret would accept tokens signed with an empty key
        let decoding_key = if config.secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(config.secret.as_bytes()))
        };

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<RelayClaims, AppError> {
        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AppError::Auth("Relay authentication is not configured".to_string()))?;

        let token_data = decode::<RelayClaims>(token, decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        let claims = token_data.claims;
        if !claims.has_scope(PUSH_SCOPE) {
            return Err(AppError::Auth(format!("Token lacks {} scope", PUSH_SCOPE)));
        }

        Ok(claims)
    }

    /// Validate a token and resolve the calling installation
    pub fn authenticate(&self, token: &str) -> Result<InstallationCaller, AppError> {
        let claims = self.validate(token)?;
        let installation_id = claims
            .installation_id()
            .ok_or_else(|| AppError::Auth("Token subject is not an installation".to_string()))?;

        Ok(InstallationCaller { installation_id })
    }
}
