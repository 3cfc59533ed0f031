use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::device::ClientType;

/// Discriminated notification type. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PushType {
    SyncCipherUpdate,
    SyncCipherCreate,
    SyncLoginDelete,
    SyncFolderDelete,
    SyncCiphers,
    SyncVault,
    SyncOrgKeys,
    SyncFolderCreate,
    SyncFolderUpdate,
    SyncCipherDelete,
    SyncSettings,
    LogOut,
    SyncSendCreate,
    SyncSendUpdate,
    SyncSendDelete,
    AuthRequest,
    AuthRequestResponse,
}

const PUSH_TYPES: [PushType; 17] = [
    PushType::SyncCipherUpdate,
    PushType::SyncCipherCreate,
    PushType::SyncLoginDelete,
    PushType::SyncFolderDelete,
    PushType::SyncCiphers,
    PushType::SyncVault,
    PushType::SyncOrgKeys,
    PushType::SyncFolderCreate,
    PushType::SyncFolderUpdate,
    PushType::SyncCipherDelete,
    PushType::SyncSettings,
    PushType::LogOut,
    PushType::SyncSendCreate,
    PushType::SyncSendUpdate,
    PushType::SyncSendDelete,
    PushType::AuthRequest,
    PushType::AuthRequestResponse,
];

impl From<PushType> for u8 {
    fn from(value: PushType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for PushType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PUSH_TYPES
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown push type {}", value))
    }
}

impl fmt::Display for PushType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Logical audience of a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum Audience {
    /// Every registered device
    Global,
    /// Every device owned by the user
    User(String),
    /// Every device entitled to the organization's pushes
    Organization(String),
    /// Every device registered through the installation
    Installation(String),
}

impl Audience {
    pub fn label(&self) -> &'static str {
        match self {
            Audience::Global => "global",
            Audience::User(_) => "user",
            Audience::Organization(_) => "organization",
            Audience::Installation(_) => "installation",
        }
    }
}

/// A typed push with its delivery options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub push_type: PushType,
    pub payload: serde_json::Value,
    /// Context id clients use for deduplication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Originating device, excluded from delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_device_id: Option<String>,
    #[serde(default)]
    pub client_type: ClientType,
}

impl PushNotification {
    pub fn new(push_type: PushType, payload: serde_json::Value) -> Self {
        Self {
            push_type,
            payload,
            identifier: None,
            exclude_device_id: None,
            client_type: ClientType::All,
        }
    }

    /// Key-resync push sent to a user whose organization access changed
    pub fn sync_org_keys(user_id: &str) -> Self {
        Self::new(
            PushType::SyncOrgKeys,
            serde_json::json!({ "userId": user_id, "date": Utc::now() }),
        )
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn exclude_device(mut self, device_id: impl Into<String>) -> Self {
        self.exclude_device_id = Some(device_id.into());
        self
    }

    pub fn client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = client_type;
        self
    }
}

/// Envelope handed to the push transport for a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub push_type: PushType,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl From<&PushNotification> for PushMessage {
    fn from(notification: &PushNotification) -> Self {
        Self {
            push_type: notification.push_type,
            payload: notification.payload.clone(),
            context_id: notification.identifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_type_codes() {
        assert_eq!(u8::from(PushType::SyncOrgKeys), 6);
        assert_eq!(PushType::try_from(11), Ok(PushType::LogOut));
        assert!(PushType::try_from(99).is_err());
        assert_eq!(serde_json::to_string(&PushType::AuthRequest).unwrap(), "15");
    }

    #[test]
    fn test_notification_builder() {
        let notification = PushNotification::new(PushType::SyncVault, serde_json::Value::Null)
            .identifier("ctx-1")
            .exclude_device("d1")
            .client_type(ClientType::Mobile);

        assert_eq!(notification.identifier.as_deref(), Some("ctx-1"));
        assert_eq!(notification.exclude_device_id.as_deref(), Some("d1"));
        assert_eq!(notification.client_type, ClientType::Mobile);
    }

    #[test]
    fn test_sync_org_keys_payload() {
        let notification = PushNotification::sync_org_keys("u1");
        assert_eq!(notification.push_type, PushType::SyncOrgKeys);
        assert_eq!(notification.payload["userId"], "u1");
        assert!(notification.payload.get("date").is_some());
    }

    #[test]
    fn test_message_carries_context_id() {
        let notification =
            PushNotification::new(PushType::SyncCiphers, serde_json::json!({})).identifier("ctx");
        let message = PushMessage::from(&notification);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], 4);
        assert_eq!(json["contextId"], "ctx");
    }
}
