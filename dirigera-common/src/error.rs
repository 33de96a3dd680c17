use thiserror::Error;

/// Common error type for the Dirigera bridge components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot apply patch to device {device_id}: {reason}")]
    Patch { device_id: String, reason: String },
}

impl Error {
    /// Create a patch rejection error.
    pub fn patch(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Patch {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using the bridge's common Error.
pub type Result<T> = std::result::Result<T, Error>;
