//! Exposition namespace: the set of currently exported device series.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::{self, Write};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

/// Current value of a series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    /// Gauge, `None` until a first value is known.
    Gauge(Option<f64>),
    /// State set with the index of the current state.
    StateSet {
        states: &'static [&'static str],
        current: Option<usize>,
    },
    /// Info series labels.
    Info(Vec<(String, String)>),
}

impl SeriesValue {
    /// An empty state set over `states`.
    pub fn state_set(states: &'static [&'static str]) -> Self {
        Self::StateSet {
            states,
            current: None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Gauge(_) => "gauge",
            Self::StateSet { .. } => "stateset",
            Self::Info(_) => "info",
        }
    }

    fn same_kind(&self, other: &SeriesValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A series to register.
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub name: String,
    pub help: String,
    pub value: SeriesValue,
}

/// One device's claim on a series name.
#[derive(Debug, Clone)]
struct Claim {
    /// Id of the device that registered the series.
    owner: String,
    help: String,
    value: SeriesValue,
}

/// A registered series.
///
/// `current` is exported. Claims displaced by a later registration of the
/// same name wait in `shadowed`, most recent last, and keep receiving
/// their owner's writes.
#[derive(Debug, Clone)]
struct Series {
    current: Claim,
    shadowed: Vec<Claim>,
}

/// Thread-safe store of exported series, keyed by name.
///
/// Every series remembers its owner. When a device registers a name that
/// is already taken, it takes the name over and the previous owner's claim
/// is kept aside; it is exported again once the newer owner unregisters.
#[derive(Debug, Default)]
pub struct MetricNamespace {
    series: RwLock<BTreeMap<String, Series>>,
}

/// Create a shareable namespace handle.
pub type SharedNamespace = Arc<MetricNamespace>;

impl MetricNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register all series of a device under a single lock.
    ///
    /// A name that is already registered by another device is taken over
    /// by `owner`. Returns the number of series that were taken over.
    pub fn register_all(&self, owner: &str, specs: Vec<SeriesSpec>) -> usize {
        let mut series = self.series.write();
        let mut collisions = 0;

        for spec in specs {
            let claim = Claim {
                owner: owner.to_string(),
                help: spec.help,
                value: spec.value,
            };

            match series.entry(spec.name) {
                Entry::Vacant(entry) => {
                    entry.insert(Series {
                        current: claim,
                        shadowed: Vec::new(),
                    });
                }
                Entry::Occupied(mut entry) => {
                    let name = entry.key().clone();
                    let entry = entry.get_mut();
                    entry.shadowed.retain(|c| c.owner != owner);
                    if entry.current.owner == owner {
                        entry.current = claim;
                        continue;
                    }

                    collisions += 1;
                    warn!(
                        series = %name,
                        previous_owner = %entry.current.owner,
                        owner = %owner,
                        "Series name collision, the newer device takes it over"
                    );
                    let previous = std::mem::replace(&mut entry.current, claim);
                    entry.shadowed.push(previous);
                }
            }
        }

        collisions
    }

    /// Overwrite series values under a single lock.
    ///
    /// Writes to a name taken over by another device update the owner's
    /// shadowed claim. Updates are ignored for series the owner never
    /// registered or that hold a different kind of value. Returns the
    /// number of claims written.
    pub fn apply(&self, owner: &str, updates: Vec<(String, SeriesValue)>) -> usize {
        let mut series = self.series.write();
        let mut written = 0;

        for (name, value) in updates {
            let Some(entry) = series.get_mut(&name) else {
                trace!(series = %name, "Skipping write to unregistered series");
                continue;
            };

            let claim = if entry.current.owner == owner {
                Some(&mut entry.current)
            } else {
                entry.shadowed.iter_mut().find(|c| c.owner == owner)
            };

            match claim {
                Some(claim) if claim.value.same_kind(&value) => {
                    claim.value = value;
                    written += 1;
                }
                Some(_) => {
                    warn!(series = %name, "Skipping write with mismatched series kind");
                }
                None => {
                    trace!(series = %name, owner = %owner, "Skipping write to series owned by another device");
                }
            }
        }

        written
    }

    /// Release the claims of `owner` on the named series. Returns the
    /// number of claims released.
    ///
    /// A series whose exported claim is released goes back to the most
    /// recently displaced owner, or is removed when there is none.
    pub fn unregister<'a, I>(&self, owner: &str, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut series = self.series.write();
        let mut removed = 0;

        for name in names {
            let Some(entry) = series.get_mut(name) else {
                continue;
            };

            if entry.current.owner == owner {
                removed += 1;
                match entry.shadowed.pop() {
                    Some(previous) => {
                        debug!(series = %name, owner = %previous.owner, "Series handed back to displaced device");
                        entry.current = previous;
                    }
                    None => {
                        series.remove(name);
                    }
                }
            } else {
                let before = entry.shadowed.len();
                entry.shadowed.retain(|c| c.owner != owner);
                removed += before - entry.shadowed.len();
            }
        }

        removed
    }

    /// Get the current number of registered series.
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.read().contains_key(name)
    }

    /// Id of the device owning a series.
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.series.read().get(name).map(|s| s.current.owner.clone())
    }

    /// Current value of a series.
    pub fn value_of(&self, name: &str) -> Option<SeriesValue> {
        self.series.read().get(name).map(|s| s.current.value.clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }

    /// Encode every series in OpenMetrics text format, sorted by name.
    ///
    /// The `# EOF` terminator is not written.
    pub fn encode(&self, output: &mut String) -> fmt::Result {
        let series = self.series.read();

        for (name, entry) in series.iter() {
            let entry = &entry.current;
            writeln!(output, "# HELP {} {}", name, escape_label_value(&entry.help))?;
            writeln!(output, "# TYPE {} {}", name, entry.value.type_name())?;

            match &entry.value {
                SeriesValue::Gauge(Some(value)) => {
                    writeln!(output, "{} {}", name, format_value(*value))?;
                }
                SeriesValue::Gauge(None) => {}
                SeriesValue::StateSet { states, current } => {
                    for (index, state) in states.iter().enumerate() {
                        let active = u8::from(*current == Some(index));
                        writeln!(
                            output,
                            "{}{{{}=\"{}\"}} {}",
                            name,
                            name,
                            escape_label_value(state),
                            active
                        )?;
                    }
                }
                SeriesValue::Info(labels) => {
                    writeln!(output, "{}_info{} 1", name, format_labels(labels))?;
                }
            }
        }

        Ok(())
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for exposition.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for exposition.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
