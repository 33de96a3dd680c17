//! Integration tests for dirigera-common library.

use dirigera_common::{
    BASE_FIELDS, DevicePatch, DeviceSnapshot, SchemaCatalog, ValueType, parse_config,
};
use serde_json::json;

fn hub_device_list() -> serde_json::Value {
    json!([
        {
            "id": "a1b2c3_1",
            "type": "sensor",
            "deviceType": "environmentSensor",
            "isReachable": true,
            "attributes": {
                "customName": "Air quality",
                "model": "VINDSTYRKA",
                "manufacturer": "IKEA of Sweden",
                "firmwareVersion": "1.0.11",
                "hardwareVersion": "1",
                "currentTemperature": 21.4,
                "currentRH": 45,
                "currentPM25": 3,
                "vocIndex": 100
            },
            "capabilities": {"canSend": [], "canReceive": ["customName"]},
            "room": {"id": "room-1", "name": "Living Room", "color": "ikea_blue", "icon": "rooms_sofa"},
            "remoteLinks": [],
            "isHidden": false
        },
        {
            "id": "d4e5f6_1",
            "type": "outlet",
            "deviceType": "outlet",
            "isReachable": false,
            "attributes": {
                "customName": "Heater",
                "model": "TRETAKT Smart plug",
                "manufacturer": "IKEA of Sweden",
                "firmwareVersion": "2.3.089",
                "hardwareVersion": "1",
                "isOn": false,
                "startupOnOff": "startPrevious"
            },
            "capabilities": {"canSend": [], "canReceive": ["isOn"]},
            "remoteLinks": [],
            "isHidden": true
        }
    ])
}

#[test]
fn test_decode_hub_device_list_against_catalog() {
    let catalog = SchemaCatalog::builtin();
    let devices: Vec<DeviceSnapshot> = hub_device_list()
        .as_array()
        .unwrap()
        .iter()
        .cloned()
        .map(|v| DeviceSnapshot::from_json(v).unwrap())
        .collect();

    assert_eq!(devices.len(), 2);
    for device in &devices {
        let fields = catalog
            .fields(&device.device_type)
            .expect("device type should be in the builtin catalog");
        // Every attribute the hub sent is declared for the type.
        for key in device.attributes.keys() {
            assert!(
                fields.iter().any(|f| f.key == key.as_str()),
                "{} not declared for {}",
                key,
                device.device_type
            );
        }
    }
}

#[test]
fn test_state_change_sequence() {
    let catalog = SchemaCatalog::builtin();
    let mut outlet = DeviceSnapshot::from_json(hub_device_list()[1].clone()).unwrap();

    for (is_on, power) in [(true, 120.5), (true, 118.0), (false, 0.0)] {
        let patch = DevicePatch::from_json(json!({
            "id": "d4e5f6_1",
            "isReachable": true,
            "attributes": {"isOn": is_on, "currentActivePower": power}
        }))
        .unwrap();
        outlet.apply(&patch, &catalog).unwrap();
    }

    assert!(outlet.is_reachable);
    assert_eq!(outlet.attribute("isOn"), Some(&json!(false)));
    assert_eq!(outlet.attribute("currentActivePower"), Some(&json!(0.0)));
    assert_eq!(outlet.attribute_text("startupOnOff").as_deref(), Some("startPrevious"));
}

#[test]
fn test_base_fields_are_textual_or_optional_scalars() {
    for field in BASE_FIELDS {
        let inner = field.value_type.unwrap_optional();
        assert!(
            !matches!(inner, ValueType::Object | ValueType::List(_)),
            "base field {} must be a scalar",
            field.name
        );
    }
}

#[test]
fn test_parse_config_generic() {
    #[derive(serde::Deserialize)]
    struct Probe {
        address: String,
    }

    let probe: Probe = parse_config(r#"{ address: "192.168.1.20" }"#).unwrap();
    assert_eq!(probe.address, "192.168.1.20");
}
