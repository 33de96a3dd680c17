//! Derivation of series names from device metadata.

/// Normalize a human-readable string into a series-name token.
///
/// - ASCII lowercase letters and digits are kept
/// - An uppercase ASCII letter starts a new word and is lowercased
/// - Every other character is a separator
/// - Separator runs collapse into one underscore, leading and trailing
///   separators are dropped
///
/// `"Living Room"` becomes `living_room`, `"colorTemperature"` becomes
/// `color_temperature`.
pub fn tokenize(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 4);
    let mut pending_separator = false;

    for c in input.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !result.is_empty() {
                result.push('_');
            }
            pending_separator = false;
            result.push(c);
        } else if c.is_ascii_uppercase() {
            if !result.is_empty() {
                result.push('_');
            }
            pending_separator = false;
            result.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    result
}

/// Series-name fragment of a device.
///
/// `room_customName_deviceType`, each part tokenized, with the room part
/// omitted when the device has no room. The result is not unique: two
/// devices with the same room, name and type get the same fragment.
///
/// Empty parts are kept, so an unnamed light in the kitchen yields
/// `kitchen__light`.
pub fn derive_name(room: Option<&str>, custom_name: &str, device_type: &str) -> String {
    let mut name = String::new();
    if let Some(room) = room {
        name.push_str(&tokenize(room));
        name.push('_');
    }
    name.push_str(&tokenize(custom_name));
    name.push('_');
    name.push_str(&tokenize(device_type));

    // Metric names must not start with a digit.
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    name
}

/// Full name of the series exporting one attribute.
pub fn attribute_series_name(device_name: &str, attribute: &str) -> String {
    format!("{}_{}", device_name, attribute)
}

/// Name of the descriptive info series of a device.
pub fn info_series_name(device_name: &str) -> String {
    attribute_series_name(device_name, "attributes")
}
