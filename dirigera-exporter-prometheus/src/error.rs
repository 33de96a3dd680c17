//! Error types for the exporter.

use thiserror::Error;

use dirigera_common::ValueType;
use dirigera_hub::HubError;

/// Errors that fail a whole exporter operation (startup, reconciliation, scrape).
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The hub refused the access token.
    #[error("Authentication error: {0}")]
    Authentication(#[source] HubError),

    /// The hub could not be reached or did not answer in time.
    #[error("Hub unreachable: {0}")]
    HubUnreachable(#[source] HubError),

    /// Any other transport failure.
    #[error("Hub transport error: {0}")]
    Transport(#[source] HubError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to render metrics: {0}")]
    Render(String),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl From<HubError> for ExporterError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Authentication { .. } => Self::Authentication(err),
            HubError::Unreachable(_) => Self::HubUnreachable(err),
            other => Self::Transport(other),
        }
    }
}

impl From<dirigera_common::Error> for ExporterError {
    fn from(err: dirigera_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Errors that fail the construction or update of a single device record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An extension attribute has a value type with no metric kind.
    #[error("Attribute {attribute} of device type {device_type} has unsupported type {value_type}")]
    UnsupportedAttributeType {
        device_type: String,
        attribute: String,
        value_type: ValueType,
    },

    /// The device type has no declared attribute schema.
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    /// A record was asked to take the snapshot of another device.
    #[error("Device {expected} cannot be updated with snapshot of device {actual}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("Invalid patch: {0}")]
    Patch(#[from] dirigera_common::Error),
}

/// An event frame that could not be decoded.
#[derive(Debug, Error)]
#[error("Malformed event: {0}")]
pub struct MalformedEvent(pub String);

/// Result type for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;
