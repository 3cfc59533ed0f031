use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Scope an installation token must carry to use the relay
pub const PUSH_SCOPE: &str = "api.push";

const INSTALLATION_SUBJECT_PREFIX: &str = "installation.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayClaims {
    /// Subject (`installation.{id}`)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Granted scopes. Identity servers emit either a single string or a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub scope: Vec<String>,
}

impl RelayClaims {
    pub fn for_installation(installation_id: Uuid, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: format!("{}{}", INSTALLATION_SUBJECT_PREFIX, installation_id),
            exp: now + ttl_seconds,
            iat: now,
            scope: vec![PUSH_SCOPE.to_string()],
        }
    }

    /// Installation id encoded in the subject, if the subject is an installation
    pub fn installation_id(&self) -> Option<Uuid> {
        self.sub
            .strip_prefix(INSTALLATION_SUBJECT_PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

/// Authenticated relay caller, inserted into request extensions by the
/// relay auth middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationCaller {
    pub installation_id: Uuid,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(scope) => scope.split_whitespace().map(str::to_string).collect(),
        OneOrMany::Many(scopes) => scopes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installation_subject() {
        let id = Uuid::new_v4();
        let claims = RelayClaims::for_installation(id, 60);
        assert_eq!(claims.installation_id(), Some(id));
        assert!(claims.has_scope(PUSH_SCOPE));
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_non_installation_subject() {
        let claims = RelayClaims {
            sub: "user-123".to_string(),
            exp: 0,
            iat: 0,
            scope: vec![],
        };
        assert_eq!(claims.installation_id(), None);
        assert!(claims.is_expired());
    }

    #[test]
    fn test_scope_as_string() {
        let claims: RelayClaims = serde_json::from_value(serde_json::json!({
            "sub": "installation.x",
            "exp": 1,
            "iat": 0,
            "scope": "api.push offline_access"
        }))
        .unwrap();
        assert_eq!(claims.scope, vec!["api.push", "offline_access"]);
    }
}
