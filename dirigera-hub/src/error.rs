//! Error types for the hub transport.

use thiserror::Error;

/// Errors raised while talking to the hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// The access token was refused.
    #[error("Authentication rejected by the hub (HTTP {status})")]
    Authentication { status: u16 },

    /// Connection refused, DNS failure or timeout.
    #[error("Hub unreachable: {0}")]
    Unreachable(String),

    /// Any other non-success HTTP status.
    #[error("Hub returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The hub answered with something that is not the expected JSON.
    #[error("Failed to decode hub response: {0}")]
    Decode(String),

    #[error("Invalid hub URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The event stream broke after it was established.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl HubError {
    /// Whether the failure is a refused credential.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Classify a status code from an HTTP response or upgrade.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication { status },
            _ => Self::Status { status, body },
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response) => Self::from_status(response.status().as_u16(), String::new()),
            WsError::Io(e) => Self::Unreachable(e.to_string()),
            WsError::Tls(e) => Self::Tls(e.to_string()),
            other => Self::WebSocket(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(HubError::from_status(401, String::new()).is_authentication());
        assert!(HubError::from_status(403, String::new()).is_authentication());
        assert!(matches!(
            HubError::from_status(500, "boom".into()),
            HubError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_display() {
        let err = HubError::Authentication { status: 401 };
        assert_eq!(err.to_string(), "Authentication rejected by the hub (HTTP 401)");
    }
}
