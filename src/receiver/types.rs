use serde::{Deserialize, Serialize};

/// The receiver we found at startup. Never changes while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// e.g. http://192.168.1.20:8090/v1.6
    pub base_url: String,
    pub model: String,
    pub serial_number: String,
    pub hardware_id: String,
    pub software_version: String,
}

/// GET /power
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    #[serde(default)]
    pub state: String,
}

impl PowerState {
    pub fn offline() -> Self {
        Self {
            state: "offline".to_string(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state == "on"
    }
}

/// GET /volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeState {
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub state: i64,
}

/// GET /channels/current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    #[serde(default)]
    pub channel_number: i64,
    #[serde(default = "unknown_list")]
    pub channel_list_id: String,
}

fn unknown_list() -> String {
    "Unknown".to_string()
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            channel_number: 0,
            channel_list_id: unknown_list(),
        }
    }
}
