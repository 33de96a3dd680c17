//! REST client for the hub.
//!
//! Wraps `reqwest::Client` with the hub's URL layout (`https://<hub>:8443/v1/`)
//! and bearer-token authentication, and implements [`HubTransport`] on top of
//! it together with the websocket event stream.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use dirigera_common::DeviceSnapshot;

use crate::error::HubError;
use crate::transport::{EventStream, HubTransport, Scene};
use crate::websocket;

/// Default port of the hub API.
pub const DEFAULT_PORT: u16 = 8443;

/// Connection settings for a hub.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Hostname or IP address of the hub.
    pub address: String,
    pub port: u16,
    /// Access token issued by the hub during pairing.
    pub token: SecretString,
    /// Bound applied to every request and to the websocket handshake.
    pub timeout: Duration,
    /// The hub serves a self-signed certificate.
    pub accept_invalid_certs: bool,
}

impl HubSettings {
    pub fn new(address: impl Into<String>, token: SecretString) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            token,
            timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }

    /// Host part of the URLs, bracketing IPv6 literals.
    fn host(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        }
    }

    pub fn api_url(&self) -> Result<Url, HubError> {
        Ok(Url::parse(&format!("https://{}:{}/v1/", self.host(), self.port))?)
    }

    pub fn events_url(&self) -> Result<Url, HubError> {
        Ok(Url::parse(&format!("wss://{}:{}/v1", self.host(), self.port))?)
    }
}

/// HTTP client for the hub API.
pub struct HubClient {
    http: reqwest::Client,
    api_url: Url,
    events_url: Url,
    token: SecretString,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl HubClient {
    /// Build a client from connection settings.
    pub fn new(settings: &HubSettings) -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .user_agent(concat!("dirigera-prometheus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubError::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: settings.api_url()?,
            events_url: settings.events_url()?,
            token: settings.token.clone(),
            timeout: settings.timeout,
            accept_invalid_certs: settings.accept_invalid_certs,
        })
    }

    /// Build a client against explicit base URLs with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        api_url: Url,
        events_url: Url,
        token: SecretString,
    ) -> Self {
        Self {
            http,
            api_url,
            events_url,
            token,
            timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Send a GET request and decode the JSON body.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HubError> {
        let url = self.api_url.join(path)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::from_status(status.as_u16(), body));
        }

        resp.json::<T>().await.map_err(|e| HubError::Decode(e.to_string()))
    }

    /// All devices.
    ///
    /// Entries without an id are skipped. An entry with an id that cannot be
    /// decoded fails the whole fetch.
    pub async fn devices(&self) -> Result<Vec<DeviceSnapshot>, HubError> {
        let raw: Vec<Value> = self.get("devices").await?;
        let total = raw.len();

        let mut devices = Vec::with_capacity(total);
        for value in raw {
            let id = value.get("id").and_then(Value::as_str).map(str::to_string);
            match (DeviceSnapshot::from_json(value), id) {
                (Ok(device), _) => devices.push(device),
                (Err(e), None) => warn!(error = %e, "Skipping device entry without an id"),
                (Err(e), Some(id)) => {
                    return Err(HubError::Decode(format!("device {id}: {e}")));
                }
            }
        }

        debug!(total, decoded = devices.len(), "Fetched devices");
        Ok(devices)
    }

    pub async fn scenes(&self) -> Result<Vec<Scene>, HubError> {
        self.get("scenes").await
    }
}

#[async_trait]
impl HubTransport for HubClient {
    async fn fetch_all_devices(&self) -> Result<Vec<DeviceSnapshot>, HubError> {
        self.devices().await
    }

    async fn fetch_scenes(&self) -> Result<Vec<Scene>, HubError> {
        self.scenes().await
    }

    async fn events(&self) -> Result<EventStream, HubError> {
        websocket::connect(
            &self.events_url,
            self.token.expose_secret(),
            self.accept_invalid_certs,
            self.timeout,
        )
        .await
    }
}
