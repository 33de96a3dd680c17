//! Per-device metric records.
//!
//! A [`DeviceMetric`] owns the series of one device: an info series named
//! `<name>_attributes` with descriptive fields, and one series per
//! extension attribute named `<name>_<attribute>`. The set of series is
//! fixed when the record is created; later snapshots only change values.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use dirigera_common::{DevicePatch, DeviceSnapshot, SchemaCatalog, value_to_string};

use crate::classifier::{AttributeClassifier, AttributeKind, Classification};
use crate::error::RecordError;
use crate::namespace::{SeriesSpec, SeriesValue, SharedNamespace};
use crate::naming::{attribute_series_name, derive_name, info_series_name};

/// Rendered value of an absent textual attribute.
pub const ABSENT_TEXT: &str = "none";

/// Label key of textual attribute series.
const TEXT_LABEL: &str = "value";

/// The exported series of one device.
#[derive(Debug)]
pub struct DeviceMetric {
    device: DeviceSnapshot,
    name: String,
    classification: Arc<Classification>,
    namespace: SharedNamespace,
    /// Info series first, then one per classified attribute.
    series: Vec<String>,
    registered: bool,
}

impl DeviceMetric {
    /// Create the record of a device and register its series.
    ///
    /// Classification happens before anything is registered, so a failure
    /// leaves the namespace untouched.
    pub fn new(
        device: DeviceSnapshot,
        namespace: SharedNamespace,
        classifier: &AttributeClassifier,
    ) -> Result<Self, RecordError> {
        let classification = classifier.classification(&device.device_type)?;
        let name = derive_name(device.room_name(), device.custom_name(), &device.device_type);

        info!(device_id = %device.id, name = %name, "Creating device metrics");

        let attribute_help = format!(
            "Values related to the {} accessory {} ({})",
            device.device_type, name, device.id
        );
        let mut specs = Vec::with_capacity(classification.len() + 1);
        specs.push(SeriesSpec {
            name: info_series_name(&name),
            help: format!("Accessory named \"{}\", id \"{}\"", name, device.id),
            value: SeriesValue::Info(Vec::new()),
        });
        for attribute in &classification.attributes {
            let value = match attribute.kind {
                AttributeKind::Numeric => SeriesValue::Gauge(None),
                AttributeKind::Boolean | AttributeKind::Enumerated(_) => {
                    SeriesValue::state_set(attribute.kind.states().unwrap_or_default())
                }
                AttributeKind::Textual => SeriesValue::Info(Vec::new()),
            };
            specs.push(SeriesSpec {
                name: attribute_series_name(&name, attribute.name),
                help: attribute_help.clone(),
                value,
            });
        }

        let series = specs.iter().map(|s| s.name.clone()).collect();
        let mut record = Self {
            device,
            name,
            classification,
            namespace,
            series,
            registered: false,
        };

        // Register with the current values so a concurrent render never
        // sees the placeholders.
        let mut values: HashMap<String, SeriesValue> =
            record.current_values().into_iter().collect();
        for spec in &mut specs {
            if let Some(value) = values.remove(&spec.name) {
                spec.value = value;
            }
        }
        record.namespace.register_all(&record.device.id, specs);
        record.registered = true;
        Ok(record)
    }

    pub fn id(&self) -> &str {
        &self.device.id
    }

    /// Series-name fragment shared by all series of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &DeviceSnapshot {
        &self.device
    }

    /// Names of the series of this record.
    pub fn series_names(&self) -> &[String] {
        &self.series
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Write the held snapshot into the series. Returns the number of
    /// series written.
    pub fn populate(&self) -> usize {
        if !self.registered {
            return 0;
        }

        let updates = self.current_values();
        let written = self.namespace.apply(&self.device.id, updates);
        debug!(device_id = %self.device.id, written, "Populated device metrics");
        written
    }

    /// Values of the held snapshot, one per series that has a value to
    /// write.
    fn current_values(&self) -> Vec<(String, SeriesValue)> {
        let mut updates = Vec::with_capacity(self.series.len());
        updates.push((
            info_series_name(&self.name),
            SeriesValue::Info(self.info_labels()),
        ));

        for attribute in &self.classification.attributes {
            let series = attribute_series_name(&self.name, attribute.name);
            let raw = self.device.attribute(attribute.key);

            let value = match (attribute.kind, raw) {
                (AttributeKind::Textual, raw) => Some(SeriesValue::Info(vec![(
                    TEXT_LABEL.to_string(),
                    raw.map(value_to_string)
                        .unwrap_or_else(|| ABSENT_TEXT.to_string()),
                )])),
                (_, None) => None,
                (AttributeKind::Numeric, Some(raw)) => match coerce_number(raw) {
                    Some(number) => Some(SeriesValue::Gauge(Some(number))),
                    None => {
                        warn!(
                            device_id = %self.device.id,
                            series = %series,
                            value = %raw,
                            "Ignoring non-numeric value"
                        );
                        None
                    }
                },
                (AttributeKind::Boolean, Some(raw)) => Some(SeriesValue::StateSet {
                    states: crate::classifier::BOOLEAN_STATES,
                    current: Some(usize::from(coerce_bool(raw))),
                }),
                (AttributeKind::Enumerated(labels), Some(raw)) => {
                    let label = value_to_string(raw);
                    match labels.iter().position(|l| *l == label) {
                        Some(index) => Some(SeriesValue::StateSet {
                            states: labels,
                            current: Some(index),
                        }),
                        None => {
                            warn!(
                                device_id = %self.device.id,
                                series = %series,
                                value = %label,
                                "Ignoring value outside of the declared states"
                            );
                            None
                        }
                    }
                }
            };

            if let Some(value) = value {
                updates.push((series, value));
            }
        }

        updates
    }

    /// Replace the held snapshot and repopulate.
    pub fn update(&mut self, device: DeviceSnapshot) -> Result<(), RecordError> {
        if device.id != self.device.id {
            return Err(RecordError::IdentityMismatch {
                expected: self.device.id.clone(),
                actual: device.id,
            });
        }

        self.device = device;
        self.populate();
        Ok(())
    }

    /// Merge a partial update into the held snapshot and repopulate.
    ///
    /// A rejected patch leaves both the snapshot and the series unchanged.
    pub fn apply_patch(
        &mut self,
        patch: &DevicePatch,
        catalog: &SchemaCatalog,
    ) -> Result<(), RecordError> {
        if patch.id != self.device.id {
            return Err(RecordError::IdentityMismatch {
                expected: self.device.id.clone(),
                actual: patch.id.clone(),
            });
        }

        self.device.apply(patch, catalog)?;
        self.populate();
        Ok(())
    }

    /// Remove the series of this record from the namespace.
    ///
    /// Only series still owned by this device are removed. Calling it again
    /// is a no-op. Returns the number of series removed.
    pub fn unregister(&mut self) -> usize {
        if !self.registered {
            return 0;
        }
        self.registered = false;

        let removed = self
            .namespace
            .unregister(&self.device.id, self.series.iter().map(String::as_str));
        info!(device_id = %self.device.id, name = %self.name, removed, "Removed device metrics");
        removed
    }

    /// Labels of the `_attributes` info series, always rebuilt in full.
    fn info_labels(&self) -> Vec<(String, String)> {
        let device = &self.device;
        let text = |key: &str| device.attribute_text(key).unwrap_or_default();

        let mut labels = vec![
            ("id".to_string(), device.id.clone()),
            ("type".to_string(), device.type_tag.clone()),
            ("device_type".to_string(), device.device_type.clone()),
            ("is_reachable".to_string(), device.is_reachable.to_string()),
            (
                "remote_links".to_string(),
                device.remote_links.len().to_string(),
            ),
            ("is_hidden".to_string(), device.is_hidden.to_string()),
            (
                "capabilities_receive".to_string(),
                device.capabilities.can_receive.len().to_string(),
            ),
            (
                "capabilities_send".to_string(),
                device.capabilities.can_send.len().to_string(),
            ),
        ];

        for (label, key) in INFO_ATTRIBUTES {
            labels.push((label.to_string(), text(key)));
        }

        if let Some(room) = &device.room {
            labels.push(("room_id".to_string(), room.id.clone()));
            labels.push(("room_name".to_string(), room.name.clone()));
            labels.push(("room_color".to_string(), room.color.clone()));
            labels.push(("room_icon".to_string(), room.icon.clone()));
        }

        labels
    }
}

/// Base attributes copied into the info series, as `(label, wire key)`.
const INFO_ATTRIBUTES: &[(&str, &str)] = &[
    ("custom_name", "customName"),
    ("model", "model"),
    ("manufacturer", "manufacturer"),
    ("firmware_version", "firmwareVersion"),
    ("serial_number", "serialNumber"),
    ("product_code", "productCode"),
    ("ota_status", "otaStatus"),
    ("ota_state", "otaState"),
    ("ota_progress", "otaProgress"),
    ("ota_policy", "otaPolicy"),
    ("ota_schedule_start", "otaScheduleStart"),
    ("ota_schedule_end", "otaScheduleEnd"),
];

/// Read a number from a JSON number or a numeric string.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean. Strings `true`, `t`, `yes` and `y` are true, in any
/// case; every other non-boolean value is false.
fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => matches!(
            value_to_string(other).to_ascii_lowercase().as_str(),
            "true" | "t" | "yes" | "y"
        ),
    }
}
