use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEVICE_TYPE: &str = "devices.types.media_device.receiver";
pub const ON_OFF: &str = "devices.capabilities.on_off";
pub const RANGE: &str = "devices.capabilities.range";
pub const TOGGLE: &str = "devices.capabilities.toggle";

/// Which of the three device endpoints a request came in on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Discovery,
    Query,
    Action,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Discovery => write!(f, "discovery"),
            QueryKind::Query => write!(f, "query"),
            QueryKind::Action => write!(f, "action"),
        }
    }
}

/// Body of the query and action calls. Discovery has no body and uses
/// `GatewayRequest::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayRequest {
    #[serde(default)]
    pub payload: Option<RequestPayload>,
}

impl GatewayRequest {
    /// devices listed in the payload, empty if there is no payload
    pub fn devices(&self) -> &[RequestDevice] {
        self.payload
            .as_ref()
            .and_then(|p| p.devices.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub devices: Option<Vec<RequestDevice>>,
}

/// Capabilities stay raw json here and are decoded one by one with
/// `CapabilityAction::decode`, so one odd entry doesn't reject the request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestDevice {
    pub id: String,
    #[serde(default)]
    pub capabilities: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeInstance {
    Volume,
    Channel,
}

impl RangeInstance {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeInstance::Volume => "volume",
            RangeInstance::Channel => "channel",
        }
    }
}

/// Remote keys. The receiver only knows "press", so the requested value
/// doesn't change what is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleInstance {
    Mute,
    Pause,
}

impl ToggleInstance {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleInstance::Mute => "mute",
            ToggleInstance::Pause => "pause",
        }
    }
}

/// A requested change to the receiver
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityAction {
    Power(bool),
    Range { instance: RangeInstance, value: i64 },
    Toggle { instance: ToggleInstance, value: bool },
    /// well-formed entry we can't carry out; counts as a failed action
    Unsupported { capability_type: String, instance: String },
}

impl CapabilityAction {
    /// Decodes one capability from an action request. Entries without a
    /// `type` or a `state` are not actions at all and give `None`.
    pub fn decode(raw: &Value) -> Option<Self> {
        let capability_type = raw.get("type")?.as_str().unwrap_or_default();
        let state = raw.get("state")?;

        let instance = state
            .get("instance")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let value = state.get("value");

        let unsupported = || CapabilityAction::Unsupported {
            capability_type: capability_type.to_string(),
            instance: instance.to_string(),
        };

        let action = match (capability_type, instance) {
            (ON_OFF, _) => value
                .and_then(Value::as_bool)
                .map(CapabilityAction::Power),
            (RANGE, "volume") => range_value(value).map(|value| CapabilityAction::Range {
                instance: RangeInstance::Volume,
                value,
            }),
            (RANGE, "channel") => range_value(value).map(|value| CapabilityAction::Range {
                instance: RangeInstance::Channel,
                value,
            }),
            (TOGGLE, "mute") => value.and_then(Value::as_bool).map(|value| CapabilityAction::Toggle {
                instance: ToggleInstance::Mute,
                value,
            }),
            (TOGGLE, "pause") => value.and_then(Value::as_bool).map(|value| CapabilityAction::Toggle {
                instance: ToggleInstance::Pause,
                value,
            }),
            _ => None,
        };

        Some(action.unwrap_or_else(unsupported))
    }

    pub fn capability_type(&self) -> &str {
        match self {
            CapabilityAction::Power(_) => ON_OFF,
            CapabilityAction::Range { .. } => RANGE,
            CapabilityAction::Toggle { .. } => TOGGLE,
            CapabilityAction::Unsupported {
                capability_type, ..
            } => capability_type,
        }
    }

    pub fn instance(&self) -> &str {
        match self {
            CapabilityAction::Power(_) => "on",
            CapabilityAction::Range { instance, .. } => instance.as_str(),
            CapabilityAction::Toggle { instance, .. } => instance.as_str(),
            CapabilityAction::Unsupported { instance, .. } => instance,
        }
    }
}

/// integers as-is, fractional numbers truncated toward zero
fn range_value(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    NotFound,
    InvalidValue,
}

/// Envelope returned by every smart home endpoint except unlink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

impl GatewayResponse {
    pub fn ok(request_id: &str, payload: ResponsePayload) -> Self {
        Self {
            request_id: Some(request_id.to_string()),
            status: ResponseStatus::Ok,
            error_code: None,
            error_message: None,
            payload: Some(payload),
        }
    }

    pub fn error(request_id: Option<&str>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.map(str::to_string),
            status: ResponseStatus::Error,
            error_code: Some(code),
            error_message: Some(message.into()),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub user_id: String,
    pub devices: Vec<DeviceObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceObject {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub capabilities: Vec<CapabilityObject>,
}

impl DeviceObject {
    /// just an id and capabilities, as used in query and action answers
    pub fn with_capabilities(id: &str, capabilities: Vec<CapabilityObject>) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            description: None,
            room: None,
            device_type: None,
            capabilities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityObject {
    #[serde(rename = "type")]
    pub capability_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrievable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// POST /v1.0/user/unlink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlinkResponse {
    pub request_id: String,
}
