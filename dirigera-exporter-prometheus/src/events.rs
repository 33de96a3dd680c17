//! Decoding of hub event frames into registry operations.

use tracing::{debug, trace};

use dirigera_common::{DevicePatch, DeviceSnapshot};
use dirigera_hub::{EventKind, HubEvent};

use crate::error::MalformedEvent;

/// A device change the registry acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Added(DeviceSnapshot),
    Removed { id: String },
    /// State or configuration change.
    Changed(DevicePatch),
}

/// Decode a raw event frame.
///
/// Returns `Ok(None)` for events that do not concern devices.
pub fn decode_event(text: &str) -> Result<Option<DeviceEvent>, MalformedEvent> {
    let event = HubEvent::parse(text).map_err(|e| MalformedEvent(e.to_string()))?;
    trace!(source = %event.source, kind = %event.kind, "Received hub event");

    if event.is_from_ignored_source() {
        debug!(source = %event.source, kind = %event.kind, "Ignoring event source");
        return Ok(None);
    }

    let decoded = match event.kind() {
        EventKind::DeviceAdded => DeviceSnapshot::from_json(event.data)
            .map(DeviceEvent::Added)
            .map_err(|e| MalformedEvent(format!("deviceAdded: {e}")))?,
        EventKind::DeviceRemoved => {
            let id = event
                .device_id()
                .ok_or_else(|| MalformedEvent("deviceRemoved without device id".into()))?;
            DeviceEvent::Removed { id: id.to_string() }
        }
        EventKind::DeviceStateChanged | EventKind::DeviceConfigurationChanged => {
            DevicePatch::from_json(event.data)
                .map(DeviceEvent::Changed)
                .map_err(|e| MalformedEvent(format!("{}: {e}", event.kind)))?
        }
        EventKind::Other(kind) => {
            debug!(kind = %kind, "Ignoring event type");
            return Ok(None);
        }
    };

    Ok(Some(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_added() {
        let text = json!({
            "source": "urn:com:ikea:homesmart:iotc:zigbee",
            "type": "deviceAdded",
            "data": {"id": "d1", "type": "light", "deviceType": "light", "attributes": {"customName": "Lamp"}}
        })
        .to_string();

        let Some(DeviceEvent::Added(device)) = decode_event(&text).unwrap() else {
            panic!("expected an added device");
        };
        assert_eq!(device.id, "d1");
        assert_eq!(device.custom_name(), "Lamp");
    }

    #[test]
    fn test_decode_removed() {
        let text = r#"{"source": "zigbee", "type": "deviceRemoved", "data": {"id": "d1"}}"#;
        assert_eq!(
            decode_event(text).unwrap(),
            Some(DeviceEvent::Removed { id: "d1".into() })
        );
    }

    #[test]
    fn test_decode_changed() {
        let text = r#"{"source": "zigbee", "type": "deviceConfigurationChanged",
                       "data": {"id": "d1", "isHidden": true, "attributes": {"customName": "Desk"}}}"#;

        let Some(DeviceEvent::Changed(patch)) = decode_event(text).unwrap() else {
            panic!("expected a patch");
        };
        assert_eq!(patch.id, "d1");
        assert_eq!(patch.is_hidden, Some(true));
    }

    #[test]
    fn test_ignored_events() {
        let ignored_source =
            r#"{"source": "urn:com:ikea:homesmart:iotc:timeservice", "type": "deviceStateChanged", "data": {"id": "x"}}"#;
        let other_type = r#"{"source": "zigbee", "type": "sceneUpdated", "data": {"id": "s1"}}"#;

        assert_eq!(decode_event(ignored_source).unwrap(), None);
        assert_eq!(decode_event(other_type).unwrap(), None);
    }

    #[test]
    fn test_malformed_events() {
        assert!(decode_event("{").is_err());
        assert!(decode_event(r#"{"source": "zigbee", "type": "deviceRemoved", "data": {}}"#).is_err());
        assert!(decode_event(r#"{"source": "zigbee", "type": "deviceAdded", "data": {"id": "d1"}}"#).is_err());
        assert!(decode_event(r#"{"source": "zigbee", "type": "deviceStateChanged", "data": {}}"#).is_err());
    }
}
