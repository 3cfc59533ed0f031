//! Wire bodies of the relay protocol. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::device::{ClientType, DeviceKey, DeviceType};
use crate::notification::PushType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRegistrationRequest {
    pub push_token: Option<String>,
    pub device_id: String,
    pub user_id: String,
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub installation_id: Option<String>,
    #[serde(default)]
    pub organization_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushDeviceRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

impl PushDeviceRequest {
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.id.clone(), self.device_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpdateRequest {
    pub devices: Vec<PushDeviceRequest>,
    pub organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSendRequest {
    #[serde(rename = "type")]
    pub push_type: PushType,
    pub payload: serde_json::Value,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    /// Originating device, excluded from delivery
    pub device_id: Option<String>,
    pub identifier: Option<String>,
    pub client_type: Option<ClientType>,
    #[serde(default)]
    pub global: bool,
}
