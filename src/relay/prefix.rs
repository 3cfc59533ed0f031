//! Installation namespacing of identifiers crossing the relay boundary.
//!
//! The client hop applies the prefix exactly once. The relay ingress never
//! re-prefixes; it only checks that incoming ids carry the caller's prefix.

use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationPrefix {
    installation_id: Uuid,
    prefix: String,
}

impl InstallationPrefix {
    pub fn new(installation_id: Uuid) -> Self {
        Self {
            installation_id,
            prefix: format!("{}_", installation_id),
        }
    }

    pub fn installation_id(&self) -> Uuid {
        self.installation_id
    }

    /// `"{installationId}_{value}"`. Blank values map to `None`.
    pub fn apply(&self, value: &str) -> Option<String> {
        if value.trim().is_empty() {
            return None;
        }
        if self.is_applied(value) {
            tracing::warn!(
                installation_id = %self.installation_id,
                value = %value,
                "Identifier already carries installation prefix, not re-applying"
            );
            return Some(value.to_string());
        }
        Some(format!("{}{}", self.prefix, value))
    }

    pub fn apply_opt(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| self.apply(v))
    }

    /// Prefix a value that must be present
    pub fn apply_required(&self, value: &str, field: &str) -> Result<String> {
        self.apply(value)
            .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
    }

    pub fn is_applied(&self, value: &str) -> bool {
        value
            .strip_prefix(&self.prefix)
            .is_some_and(|rest| !rest.is_empty())
    }

    /// Accept an incoming id only if it is namespaced for this installation
    pub fn verify<'a>(&self, value: &'a str, field: &str) -> Result<&'a str> {
        if self.is_applied(value) {
            Ok(value)
        } else {
            Err(AppError::Validation(format!(
                "{} is not namespaced for installation {}",
                field, self.installation_id
            )))
        }
    }

    /// Like [`verify`](Self::verify), treating blank values as absent
    pub fn verify_opt(&self, value: Option<&str>, field: &str) -> Result<Option<String>> {
        match value {
            Some(v) if !v.trim().is_empty() => self.verify(v, field).map(|v| Some(v.to_string())),
            _ => Ok(None),
        }
    }
}
