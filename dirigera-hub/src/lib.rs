//! Async client for the IKEA Dirigera hub.
//!
//! - [`HubTransport`] - the contract the exporter depends on
//! - [`HubClient`] - HTTPS + websocket implementation of that contract
//! - [`HubEvent`] - the `{source, type, data}` envelope of pushed events
//!
//! # Example
//!
//! ```ignore
//! use dirigera_hub::{HubClient, HubSettings, HubTransport};
//!
//! let client = HubClient::new(&HubSettings::new("192.168.1.20", token))?;
//! let devices = client.fetch_all_devices().await?;
//! ```

mod client;
mod error;
pub mod event;
mod transport;
mod websocket;

pub use client::{DEFAULT_PORT, HubClient, HubSettings};
pub use error::HubError;
pub use event::{EventKind, HubEvent};
pub use transport::{EventStream, HubTransport, Scene, SceneInfo};
