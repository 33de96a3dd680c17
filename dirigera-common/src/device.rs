//! Device snapshots as reported by the hub, and the typed patches used to
//! keep them current.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::SchemaCatalog;

/// Room a device is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

/// Capabilities a device advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub can_send: Vec<String>,
    #[serde(default)]
    pub can_receive: Vec<String>,
}

/// Point-in-time description of one device.
///
/// Attribute values are kept as the raw JSON object sent by the hub; the
/// declared schema of the device type decides how each one is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub id: String,

    /// Coarse type tag ("light", "sensor", "controller", ...).
    #[serde(rename = "type")]
    pub type_tag: String,

    /// Precise device type ("light", "environmentSensor", ...).
    pub device_type: String,

    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub is_reachable: bool,

    #[serde(default)]
    pub last_seen: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub capabilities: Capabilities,

    #[serde(default)]
    pub room: Option<Room>,

    #[serde(default)]
    pub remote_links: Vec<String>,

    #[serde(default)]
    pub is_hidden: bool,
}

impl DeviceSnapshot {
    /// Decode a snapshot from the hub's JSON representation.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Raw attribute value by wire key, with `null` treated as absent.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// Attribute rendered as a string, `None` when absent.
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        self.attribute(key).map(value_to_string)
    }

    /// The user-assigned name of the device.
    pub fn custom_name(&self) -> &str {
        self.attributes
            .get("customName")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Room name, if the device is assigned to a room.
    pub fn room_name(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.name.as_str())
    }

    /// Merge a patch into this snapshot.
    ///
    /// Every attribute in the patch is validated against the declared
    /// schema before anything is written, so a rejected patch leaves the
    /// snapshot untouched.
    pub fn apply(&mut self, patch: &DevicePatch, catalog: &SchemaCatalog) -> Result<()> {
        if patch.id != self.id {
            return Err(Error::patch(
                &self.id,
                format!("patch targets device {}", patch.id),
            ));
        }

        let mut accepted = Vec::new();
        if let Some(attributes) = &patch.attributes {
            for (key, value) in attributes {
                let Some(field) = catalog.field_by_key(&self.device_type, key) else {
                    debug!(
                        device_id = %self.id,
                        key = %key,
                        "Ignoring undeclared attribute in patch"
                    );
                    continue;
                };
                if !field.value_type.accepts(value) {
                    return Err(Error::patch(
                        &self.id,
                        format!(
                            "attribute {} expects {}, got {}",
                            key, field.value_type, value
                        ),
                    ));
                }
                accepted.push((key.clone(), value.clone()));
            }
        }

        self.attributes.extend(accepted);
        if let Some(is_reachable) = patch.is_reachable {
            self.is_reachable = is_reachable;
        }
        if let Some(is_hidden) = patch.is_hidden {
            self.is_hidden = is_hidden;
        }
        if let Some(last_seen) = &patch.last_seen {
            self.last_seen = Some(last_seen.clone());
        }
        if let Some(room) = &patch.room {
            self.room = Some(room.clone());
        }
        if let Some(capabilities) = &patch.capabilities {
            self.capabilities = capabilities.clone();
        }
        if let Some(remote_links) = &patch.remote_links {
            self.remote_links = remote_links.clone();
        }

        Ok(())
    }
}

/// Partial device update carried by state/configuration change events.
///
/// Only the paths listed here can be updated; anything else in the
/// payload is dropped during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    pub id: String,
    #[serde(default)]
    pub is_reachable: Option<bool>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub room: Option<Room>,
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
    #[serde(default)]
    pub remote_links: Option<Vec<String>>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

impl DevicePatch {
    /// Decode a patch from an event payload.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Stringify a JSON scalar without the quotes `Value::to_string` adds.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
