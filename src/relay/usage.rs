use uuid::Uuid;

use crate::config::PushConfig;
use crate::error::{AppError, Result};

use super::InstallationPrefix;

/// Decides whether the relay may be used in the current hosting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayGate {
    development: bool,
    self_hosted: bool,
    installation_id: Option<Uuid>,
}

impl RelayGate {
    pub fn new(development: bool, self_hosted: bool, installation_id: Option<Uuid>) -> Self {
        Self {
            development,
            self_hosted,
            installation_id,
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self::new(
            config.development,
            config.self_hosted,
            config.installation.id,
        )
    }

    /// Outbound calls: development, or a self-hosted instance with a known
    /// installation. Returns the prefix to namespace ids with.
    pub fn check_outbound(&self) -> Result<InstallationPrefix> {
        let permitted = self.development || (self.installation_id.is_some() && self.self_hosted);
        match (permitted, self.installation_id) {
            (true, Some(id)) => Ok(InstallationPrefix::new(id)),
            _ => Err(AppError::relay_not_configured()),
        }
    }

    /// Inbound relay calls: development, or an authenticated installation
    /// calling a hosted (not self-hosted) instance.
    pub fn check_inbound(&self, caller: Option<Uuid>) -> Result<()> {
        if self.development || (caller.is_some() && !self.self_hosted) {
            Ok(())
        } else {
            Err(AppError::relay_not_configured())
        }
    }
}
