//! Event envelopes pushed by the hub over the websocket.

use serde::Deserialize;
use serde_json::Value;

/// Event sources that never describe a device change.
pub mod sources {
    /// Hub location changes (used for sunrise/sunset computation).
    pub const TIME_SERVICE: &str = "urn:com:ikea:homesmart:iotc:timeservice";
    /// Device links and scene creation/deletion.
    pub const RULES_ENGINE: &str = "urn:com:ikea:homesmart:iotc:rulesengine";
    /// Room creation, update and deletion.
    pub const HUB: &str = "hub";
    pub const TAG_MANAGER: &str = "urn:com:ikea:homesmart:iotc:tagmanager";

    /// All sources the bridge ignores.
    pub const IGNORED: &[&str] = &[TIME_SERVICE, RULES_ENGINE, HUB, TAG_MANAGER];
}

/// What an event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    DeviceAdded,
    DeviceRemoved,
    DeviceStateChanged,
    DeviceConfigurationChanged,
    Other(String),
}

impl EventKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "deviceAdded" => Self::DeviceAdded,
            "deviceRemoved" => Self::DeviceRemoved,
            "deviceStateChanged" => Self::DeviceStateChanged,
            "deviceConfigurationChanged" => Self::DeviceConfigurationChanged,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The `{source, type, data}` envelope of every hub event.
#[derive(Debug, Clone, Deserialize)]
pub struct HubEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl HubEvent {
    /// Parse a websocket text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.kind)
    }

    /// Whether the event comes from a source that never concerns devices.
    pub fn is_from_ignored_source(&self) -> bool {
        sources::IGNORED.contains(&self.source.as_str())
    }

    /// The `data.id` field, present on every device event.
    pub fn device_id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }
}
