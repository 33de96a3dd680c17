//! Static attribute schemas per device type.
//!
//! Every device type the hub reports carries the common base attributes
//! plus a type-specific set of extension attributes. The tables below
//! declare both, keyed by the snake_case attribute name used in series
//! names and by the camelCase key used on the wire.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
    Boolean,
    Text,
    Time,
    Date,
    DateTime,
    /// A closed domain of labels.
    Enumerated(&'static [&'static str]),
    /// The attribute may be absent or `null`.
    Optional(&'static ValueType),
    List(&'static ValueType),
    Object,
}

impl ValueType {
    /// Strip one level of `Optional` wrapping.
    pub fn unwrap_optional(self) -> ValueType {
        match self {
            ValueType::Optional(inner) => *inner,
            other => other,
        }
    }

    /// Check whether a JSON value has a shape compatible with this type.
    ///
    /// Scalars coming from the hub are sometimes stringified, so strings are
    /// accepted for every scalar type. Objects and arrays are only accepted
    /// where the declaration says so.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Optional(_), Value::Null) => true,
            (ValueType::Optional(inner), other) => inner.accepts(other),
            (ValueType::Object, Value::Object(_)) => true,
            (ValueType::List(inner), Value::Array(items)) => items.iter().all(|v| inner.accepts(v)),
            (ValueType::Object | ValueType::List(_), _) => false,
            (_, Value::Object(_) | Value::Array(_) | Value::Null) => false,
            (ValueType::Integer | ValueType::Float, Value::Number(_) | Value::String(_)) => true,
            (ValueType::Boolean, Value::Bool(_) | Value::String(_)) => true,
            (ValueType::Enumerated(_), Value::String(_)) => true,
            (ValueType::Text | ValueType::Time | ValueType::Date | ValueType::DateTime, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Text => write!(f, "text"),
            ValueType::Time => write!(f, "time"),
            ValueType::Date => write!(f, "date"),
            ValueType::DateTime => write!(f, "datetime"),
            ValueType::Enumerated(labels) => write!(f, "enum[{}]", labels.join("|")),
            ValueType::Optional(inner) => write!(f, "optional<{}>", inner),
            ValueType::List(inner) => write!(f, "list<{}>", inner),
            ValueType::Object => write!(f, "object"),
        }
    }
}

/// One declared attribute of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeField {
    /// snake_case name, used in series names.
    pub name: &'static str,
    /// camelCase key in the hub's JSON.
    pub key: &'static str,
    pub value_type: ValueType,
}

/// Shorthand constructor for the static tables.
pub const fn field(name: &'static str, key: &'static str, value_type: ValueType) -> AttributeField {
    AttributeField {
        name,
        key,
        value_type,
    }
}

const OPT_INT: ValueType = ValueType::Optional(&ValueType::Integer);
const OPT_FLOAT: ValueType = ValueType::Optional(&ValueType::Float);
const OPT_BOOL: ValueType = ValueType::Optional(&ValueType::Boolean);
const OPT_TEXT: ValueType = ValueType::Optional(&ValueType::Text);
const OPT_TIME: ValueType = ValueType::Optional(&ValueType::Time);
const OPT_DATETIME: ValueType = ValueType::Optional(&ValueType::DateTime);

const STARTUP_ON_OFF: ValueType =
    ValueType::Enumerated(&["startPrevious", "startOn", "startOff", "startToggle"]);
const COLOR_MODE: ValueType = ValueType::Enumerated(&["color", "temperature"]);
const FAN_MODE: ValueType = ValueType::Enumerated(&["auto", "low", "medium", "high", "off"]);
const PLAYBACK: ValueType = ValueType::Enumerated(&[
    "playbackIdle",
    "playbackPlaying",
    "playbackPaused",
    "playbackBuffering",
]);

/// Attributes shared by every device type.
pub const BASE_FIELDS: &[AttributeField] = &[
    field("custom_name", "customName", ValueType::Text),
    field("model", "model", ValueType::Text),
    field("manufacturer", "manufacturer", ValueType::Text),
    field("firmware_version", "firmwareVersion", ValueType::Text),
    field("hardware_version", "hardwareVersion", ValueType::Text),
    field("serial_number", "serialNumber", OPT_TEXT),
    field("product_code", "productCode", OPT_TEXT),
    field("ota_status", "otaStatus", OPT_TEXT),
    field("ota_state", "otaState", OPT_TEXT),
    field("ota_progress", "otaProgress", OPT_INT),
    field("ota_policy", "otaPolicy", OPT_TEXT),
    field("ota_schedule_start", "otaScheduleStart", OPT_TIME),
    field("ota_schedule_end", "otaScheduleEnd", OPT_TIME),
];

const LIGHT: &[AttributeField] = &[
    field("is_on", "isOn", ValueType::Boolean),
    field("startup_on_off", "startupOnOff", ValueType::Optional(&STARTUP_ON_OFF)),
    field("light_level", "lightLevel", OPT_INT),
    field("color_temperature", "colorTemperature", OPT_INT),
    field("color_temperature_min", "colorTemperatureMin", OPT_INT),
    field("color_temperature_max", "colorTemperatureMax", OPT_INT),
    field("color_hue", "colorHue", OPT_FLOAT),
    field("color_saturation", "colorSaturation", OPT_FLOAT),
    field("color_mode", "colorMode", ValueType::Optional(&COLOR_MODE)),
];

const OUTLET: &[AttributeField] = &[
    field("is_on", "isOn", ValueType::Boolean),
    field("startup_on_off", "startupOnOff", ValueType::Optional(&STARTUP_ON_OFF)),
    field("status_light", "statusLight", OPT_BOOL),
    field("identify_period", "identifyPeriod", OPT_INT),
    field("permitting_join", "permittingJoin", OPT_BOOL),
    field("energy_consumed_at_last_reset", "energyConsumedAtLastReset", OPT_FLOAT),
    field("current_active_power", "currentActivePower", OPT_FLOAT),
    field("current_amps", "currentAmps", OPT_FLOAT),
    field("current_voltage", "currentVoltage", OPT_FLOAT),
    field("total_energy_consumed", "totalEnergyConsumed", OPT_FLOAT),
    field(
        "total_energy_consumed_last_updated",
        "totalEnergyConsumedLastUpdated",
        OPT_DATETIME,
    ),
    field("time_of_last_energy_reset", "timeOfLastEnergyReset", OPT_DATETIME),
    field("child_lock", "childLock", OPT_BOOL),
];

const ENVIRONMENT_SENSOR: &[AttributeField] = &[
    field("current_temperature", "currentTemperature", OPT_FLOAT),
    field("current_r_h", "currentRH", OPT_INT),
    field("current_p_m25", "currentPM25", OPT_INT),
    field("max_measured_p_m25", "maxMeasuredPM25", OPT_INT),
    field("min_measured_p_m25", "minMeasuredPM25", OPT_INT),
    field("voc_index", "vocIndex", OPT_INT),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const MOTION_SENSOR: &[AttributeField] = &[
    field("is_on", "isOn", ValueType::Boolean),
    field("is_detected", "isDetected", OPT_BOOL),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const LIGHT_SENSOR: &[AttributeField] = &[
    field("illuminance", "illuminance", OPT_INT),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const OPEN_CLOSE_SENSOR: &[AttributeField] = &[
    field("is_open", "isOpen", ValueType::Boolean),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const WATER_SENSOR: &[AttributeField] = &[
    field("water_leak_detected", "waterLeakDetected", ValueType::Boolean),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const BLINDS: &[AttributeField] = &[
    field("blinds_current_level", "blindsCurrentLevel", OPT_INT),
    field("blinds_target_level", "blindsTargetLevel", OPT_INT),
    field("blinds_state", "blindsState", OPT_TEXT),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const AIR_PURIFIER: &[AttributeField] = &[
    field("fan_mode", "fanMode", FAN_MODE),
    field("fan_mode_sequence", "fanModeSequence", ValueType::Text),
    field("motor_state", "motorState", ValueType::Integer),
    field("child_lock", "childLock", ValueType::Boolean),
    field("status_light", "statusLight", ValueType::Boolean),
    field("motor_runtime", "motorRuntime", ValueType::Integer),
    field("filter_alarm_status", "filterAlarmStatus", ValueType::Boolean),
    field("filter_elapsed_time", "filterElapsedTime", ValueType::Integer),
    field("filter_lifetime", "filterLifetime", ValueType::Integer),
    field("current_p_m25", "currentPM25", ValueType::Integer),
];

const CONTROLLER: &[AttributeField] = &[
    field("is_on", "isOn", OPT_BOOL),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const LIGHT_CONTROLLER: &[AttributeField] = &[
    field("is_on", "isOn", OPT_BOOL),
    field("light_level", "lightLevel", OPT_INT),
    field("battery_percentage", "batteryPercentage", OPT_INT),
];

const SPEAKER: &[AttributeField] = &[
    field("playback", "playback", ValueType::Optional(&PLAYBACK)),
    field("volume", "volume", OPT_INT),
    field("is_muted", "isMuted", OPT_BOOL),
];

const GATEWAY: &[AttributeField] = &[
    field("backend_connected", "backendConnected", OPT_BOOL),
    field("backend_region", "backendRegion", OPT_TEXT),
    field("country_code", "countryCode", OPT_TEXT),
    field("timezone", "timezone", OPT_TEXT),
    field("next_sunrise", "nextSunRise", OPT_DATETIME),
    field("next_sunset", "nextSunSet", OPT_DATETIME),
    field("permitting_join", "permittingJoin", OPT_BOOL),
];

const REPEATER: &[AttributeField] = &[field("permitting_join", "permittingJoin", OPT_BOOL)];

/// Extension tables for the device types known to this bridge.
const BUILTIN: &[(&str, &[AttributeField])] = &[
    ("light", LIGHT),
    ("outlet", OUTLET),
    ("environmentSensor", ENVIRONMENT_SENSOR),
    ("motionSensor", MOTION_SENSOR),
    ("lightSensor", LIGHT_SENSOR),
    ("openCloseSensor", OPEN_CLOSE_SENSOR),
    ("waterSensor", WATER_SENSOR),
    ("blinds", BLINDS),
    ("airPurifier", AIR_PURIFIER),
    ("lightController", LIGHT_CONTROLLER),
    ("blindsController", CONTROLLER),
    ("shortcutController", CONTROLLER),
    ("soundController", CONTROLLER),
    ("speaker", SPEAKER),
    ("gateway", GATEWAY),
    ("repeater", REPEATER),
];

/// Lookup table from device type to its full attribute schema
/// (base fields followed by the type's extension fields).
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: HashMap<String, Vec<AttributeField>>,
}

impl SchemaCatalog {
    /// A catalog with no device types.
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// The catalog of every device type known to this bridge.
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .fold(Self::empty(), |catalog, (device_type, extension)| {
                catalog.with_type(*device_type, extension)
            })
    }

    /// Declare (or redeclare) a device type from its extension fields.
    pub fn with_type(mut self, device_type: impl Into<String>, extension: &[AttributeField]) -> Self {
        let fields = BASE_FIELDS.iter().chain(extension).copied().collect();
        self.schemas.insert(device_type.into(), fields);
        self
    }

    /// Full attribute schema of a device type.
    pub fn fields(&self, device_type: &str) -> Option<&[AttributeField]> {
        self.schemas.get(device_type).map(Vec::as_slice)
    }

    /// Find a declared attribute of a device type by its wire key.
    pub fn field_by_key(&self, device_type: &str, key: &str) -> Option<&AttributeField> {
        self.fields(device_type)?.iter().find(|f| f.key == key)
    }

    /// Names of the known device types, sorted.
    pub fn device_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_optional_one_level() {
        assert_eq!(OPT_INT.unwrap_optional(), ValueType::Integer);
        assert_eq!(ValueType::Float.unwrap_optional(), ValueType::Float);

        let nested = ValueType::Optional(&OPT_INT);
        assert_eq!(nested.unwrap_optional(), OPT_INT);
    }

    #[test]
    fn test_accepts_scalars() {
        assert!(ValueType::Integer.accepts(&json!(3)));
        assert!(ValueType::Integer.accepts(&json!("3")));
        assert!(ValueType::Boolean.accepts(&json!(true)));
        assert!(ValueType::Text.accepts(&json!(12)));
        assert!(!ValueType::Integer.accepts(&json!({"a": 1})));
        assert!(!ValueType::Boolean.accepts(&json!([true])));
        assert!(!ValueType::Integer.accepts(&Value::Null));
    }

    #[test]
    fn test_accepts_optional_null() {
        assert!(OPT_INT.accepts(&Value::Null));
        assert!(OPT_INT.accepts(&json!(7)));
        assert!(!OPT_INT.accepts(&json!({})));
    }

    #[test]
    fn test_accepts_containers() {
        assert!(ValueType::Object.accepts(&json!({"a": 1})));
        assert!(!ValueType::Object.accepts(&json!(1)));
        assert!(ValueType::List(&ValueType::Integer).accepts(&json!([1, 2])));
        assert!(!ValueType::List(&ValueType::Integer).accepts(&json!([{"a": 1}])));
    }

    #[test]
    fn test_display() {
        assert_eq!(OPT_INT.to_string(), "optional<integer>");
        assert_eq!(COLOR_MODE.to_string(), "enum[color|temperature]");
    }

    #[test]
    fn test_builtin_catalog_includes_base_fields() {
        let catalog = SchemaCatalog::builtin();
        let light = catalog.fields("light").unwrap();

        assert_eq!(light.len(), BASE_FIELDS.len() + LIGHT.len());
        assert!(light.iter().any(|f| f.name == "custom_name"));
        assert!(light.iter().any(|f| f.name == "is_on"));
        assert!(catalog.fields("toaster").is_none());
    }

    #[test]
    fn test_field_by_key() {
        let catalog = SchemaCatalog::builtin();

        let field = catalog.field_by_key("environmentSensor", "currentRH").unwrap();
        assert_eq!(field.name, "current_r_h");
        assert!(catalog.field_by_key("environmentSensor", "isOn").is_none());
        assert!(catalog.field_by_key("light", "customName").is_some());
    }

    #[test]
    fn test_with_type_overrides() {
        const GIZMO: &[AttributeField] = &[field("spin", "spin", ValueType::Float)];
        let catalog = SchemaCatalog::empty().with_type("gizmo", GIZMO);

        assert_eq!(catalog.device_types(), vec!["gizmo"]);
        assert_eq!(catalog.fields("gizmo").unwrap().len(), BASE_FIELDS.len() + 1);
    }

    #[test]
    fn test_extension_names_are_unique_per_type() {
        let catalog = SchemaCatalog::builtin();
        for device_type in catalog.device_types() {
            let fields = catalog.fields(device_type).unwrap();
            let mut names: Vec<_> = fields.iter().map(|f| f.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), fields.len(), "duplicate field in {device_type}");
        }
    }
}
