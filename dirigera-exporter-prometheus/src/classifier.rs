//! Classification of extension attributes into metric kinds.
//!
//! The metric kind of an attribute only depends on its declared value
//! type, so classification runs once per device type and is cached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use dirigera_common::{AttributeField, BASE_FIELDS, SchemaCatalog, ValueType};

use crate::error::RecordError;

/// States of a boolean attribute, in exposition order.
pub const BOOLEAN_STATES: &[&str] = &["false", "true"];

/// How an attribute is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Integer or float, exported as a gauge.
    Numeric,
    /// Two-state series with states `false` and `true`.
    Boolean,
    /// State series over the declared value domain.
    Enumerated(&'static [&'static str]),
    /// Key/value info series.
    Textual,
}

impl AttributeKind {
    /// Kind of a declared value type, `None` if it has no metric representation.
    pub fn of(value_type: ValueType) -> Option<Self> {
        match value_type.unwrap_optional() {
            ValueType::Integer | ValueType::Float => Some(Self::Numeric),
            ValueType::Enumerated(labels) => Some(Self::Enumerated(labels)),
            ValueType::Boolean => Some(Self::Boolean),
            ValueType::Text | ValueType::Time | ValueType::Date | ValueType::DateTime => {
                Some(Self::Textual)
            }
            _ => None,
        }
    }

    /// State set of a state-series kind.
    pub fn states(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Boolean => Some(BOOLEAN_STATES),
            Self::Enumerated(labels) => Some(labels),
            Self::Numeric | Self::Textual => None,
        }
    }
}

/// One classified extension attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAttribute {
    /// snake_case name, suffix of the series name.
    pub name: &'static str,
    /// Key in the device's attribute map.
    pub key: &'static str,
    pub kind: AttributeKind,
}

/// Metric kinds of every extension attribute of a device type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub device_type: String,
    pub attributes: Vec<ClassifiedAttribute>,
}

impl Classification {
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.kind)
    }
}

/// Classify the extension attributes of a device type.
///
/// Fields whose name belongs to the base schema are left out. Any
/// remaining field without a metric kind fails the whole classification.
pub fn classify(device_type: &str, fields: &[AttributeField]) -> Result<Classification, RecordError> {
    let attributes = fields
        .iter()
        .filter(|field| !BASE_FIELDS.iter().any(|base| base.name == field.name))
        .map(|field| {
            AttributeKind::of(field.value_type)
                .map(|kind| ClassifiedAttribute {
                    name: field.name,
                    key: field.key,
                    kind,
                })
                .ok_or_else(|| RecordError::UnsupportedAttributeType {
                    device_type: device_type.to_string(),
                    attribute: field.name.to_string(),
                    value_type: field.value_type,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Classification {
        device_type: device_type.to_string(),
        attributes,
    })
}

/// Classifier backed by a schema catalog, caching results per device type.
pub struct AttributeClassifier {
    catalog: SchemaCatalog,
    cache: RwLock<HashMap<String, Arc<Classification>>>,
}

impl AttributeClassifier {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Classification of a device type, computed on first use.
    ///
    /// Failures are not cached; they are reported again on every call.
    pub fn classification(&self, device_type: &str) -> Result<Arc<Classification>, RecordError> {
        if let Some(cached) = self.cache.read().get(device_type) {
            return Ok(cached.clone());
        }

        let fields = self
            .catalog
            .fields(device_type)
            .ok_or_else(|| RecordError::UnknownDeviceType(device_type.to_string()))?;
        let classification = Arc::new(classify(device_type, fields)?);

        debug!(
            device_type = %device_type,
            attributes = classification.len(),
            "Classified device type"
        );

        self.cache
            .write()
            .insert(device_type.to_string(), classification.clone());
        Ok(classification)
    }

    /// Number of cached device types.
    pub fn cached_types(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for AttributeClassifier {
    fn default() -> Self {
        Self::new(SchemaCatalog::builtin())
    }
}
