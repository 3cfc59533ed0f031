use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Concrete client platform of a device. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DeviceType {
    Android,
    IOS,
    ChromeExtension,
    FirefoxExtension,
    OperaExtension,
    EdgeExtension,
    WindowsDesktop,
    MacOsDesktop,
    LinuxDesktop,
    ChromeBrowser,
    FirefoxBrowser,
    OperaBrowser,
    EdgeBrowser,
    IEBrowser,
    UnknownBrowser,
    AndroidAmazon,
    Uwp,
    SafariBrowser,
    VivaldiBrowser,
    VivaldiExtension,
    SafariExtension,
    Sdk,
    Server,
    WindowsCli,
    MacOsCli,
    LinuxCli,
}

const DEVICE_TYPES: [DeviceType; 26] = [
    DeviceType::Android,
    DeviceType::IOS,
    DeviceType::ChromeExtension,
    DeviceType::FirefoxExtension,
    DeviceType::OperaExtension,
    DeviceType::EdgeExtension,
    DeviceType::WindowsDesktop,
    DeviceType::MacOsDesktop,
    DeviceType::LinuxDesktop,
    DeviceType::ChromeBrowser,
    DeviceType::FirefoxBrowser,
    DeviceType::OperaBrowser,
    DeviceType::EdgeBrowser,
    DeviceType::IEBrowser,
    DeviceType::UnknownBrowser,
    DeviceType::AndroidAmazon,
    DeviceType::Uwp,
    DeviceType::SafariBrowser,
    DeviceType::VivaldiBrowser,
    DeviceType::VivaldiExtension,
    DeviceType::SafariExtension,
    DeviceType::Sdk,
    DeviceType::Server,
    DeviceType::WindowsCli,
    DeviceType::MacOsCli,
    DeviceType::LinuxCli,
];

impl DeviceType {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The client family used for platform filtering, if any
    pub fn client_type(self) -> Option<ClientType> {
        use DeviceType::*;
        match self {
            Android | IOS | AndroidAmazon => Some(ClientType::Mobile),
            ChromeExtension | FirefoxExtension | OperaExtension | EdgeExtension
            | VivaldiExtension | SafariExtension => Some(ClientType::Browser),
            WindowsDesktop | MacOsDesktop | LinuxDesktop | Uwp => Some(ClientType::Desktop),
            ChromeBrowser | FirefoxBrowser | OperaBrowser | EdgeBrowser | IEBrowser
            | UnknownBrowser | SafariBrowser | VivaldiBrowser => Some(ClientType::Web),
            WindowsCli | MacOsCli | LinuxCli => Some(ClientType::Cli),
            Sdk | Server => None,
        }
    }
}

impl From<DeviceType> for u8 {
    fn from(value: DeviceType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DEVICE_TYPES
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown device type {}", value))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Client family used to filter pushes by platform. `All` means no filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ClientType {
    #[default]
    All,
    Web,
    Browser,
    Desktop,
    Mobile,
    Cli,
}

impl ClientType {
    pub fn matches(self, device_type: DeviceType) -> bool {
        match self {
            ClientType::All => true,
            other => device_type.client_type() == Some(other),
        }
    }
}

impl From<ClientType> for u8 {
    fn from(value: ClientType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ClientType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClientType::All),
            1 => Ok(ClientType::Web),
            2 => Ok(ClientType::Browser),
            3 => Ok(ClientType::Desktop),
            4 => Ok(ClientType::Mobile),
            5 => Ok(ClientType::Cli),
            other => Err(format!("unknown client type {}", other)),
        }
    }
}

/// Directory key of a device: registrations are unique per `(id, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    pub device_id: String,
    pub device_type: DeviceType,
}

impl DeviceKey {
    pub fn new(device_id: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device_id: device_id.into(),
            device_type,
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_type.code(), self.device_id)
    }
}

/// A device known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub device_type: DeviceType,
    /// Absent means the device is not registered for push
    pub push_token: Option<String>,
    pub user_id: String,
    pub identifier: Option<String>,
    pub installation_id: Option<String>,
    /// Organizations whose pushes this device currently receives
    pub organization_ids: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.id.clone(), self.device_type)
    }

    pub fn has_push_token(&self) -> bool {
        self.push_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

/// Input of a create-or-update registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub push_token: Option<String>,
    pub device_id: String,
    pub user_id: String,
    pub identifier: Option<String>,
    pub device_type: DeviceType,
    pub installation_id: Option<String>,
    pub organization_ids: Vec<String>,
}

impl Registration {
    pub fn new(
        device_id: impl Into<String>,
        device_type: DeviceType,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            push_token: None,
            device_id: device_id.into(),
            user_id: user_id.into(),
            identifier: None,
            device_type,
            installation_id: None,
            organization_ids: Vec::new(),
        }
    }

    pub fn push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn installation_id(mut self, installation_id: impl Into<String>) -> Self {
        self.installation_id = Some(installation_id.into());
        self
    }

    pub fn organizations<I, S>(mut self, organization_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organization_ids = organization_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.device_id.clone(), self.device_type)
    }

    pub fn into_device(self) -> Device {
        Device {
            id: self.device_id,
            device_type: self.device_type,
            push_token: self.push_token.filter(|t| !t.trim().is_empty()),
            user_id: self.user_id,
            identifier: self.identifier,
            installation_id: self.installation_id,
            organization_ids: self.organization_ids.into_iter().collect(),
            updated_at: Utc::now(),
        }
    }
}
