//! Device information payloads reported by a session

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tapo_core::{ChildKind, DeviceKind};

/// Nickname reported when a device has none ("No Name")
pub const NO_NAME_NICKNAME: &str = "Tm8gTmFtZQ==";

/// Decode a base64 nickname into a display name
pub fn decode_nickname(nickname: Option<&str>) -> String {
    let encoded = match nickname {
        Some(n) if !n.trim().is_empty() => n.trim(),
        _ => NO_NAME_NICKNAME,
    };

    match STANDARD.decode(encoded) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => encoded.to_string(),
    }
}

/// Information about a top-level device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    /// Reported type, e.g. `SMART.TAPOPLUG`
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub mac: String,
    /// Base64 encoded
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub fw_ver: Option<String>,
    #[serde(default)]
    pub hw_ver: Option<String>,
}

impl DeviceInfo {
    /// A response carrying no identifying fields at all
    pub fn is_empty(&self) -> bool {
        self.device_id.is_empty() && self.device_type.is_empty() && self.model.is_empty() && self.mac.is_empty()
    }

    pub fn display_name(&self) -> String {
        decode_nickname(self.nickname.as_deref())
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::classify(&self.device_type)
    }
}

/// Information about a child device behind a hub
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default, rename = "type")]
    pub device_type: String,
    /// e.g. `subg.trigger.contact-sensor`
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub parent_device_id: Option<String>,
}

impl ChildInfo {
    pub fn display_name(&self) -> String {
        decode_nickname(self.nickname.as_deref())
    }

    pub fn kind(&self) -> ChildKind {
        ChildKind::classify(&self.device_type, &self.category)
    }
}
