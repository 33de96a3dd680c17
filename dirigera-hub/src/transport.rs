//! The contract between the bridge and whatever talks to the hub.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Deserialize;

use dirigera_common::DeviceSnapshot;

use crate::error::HubError;

/// Raw text frames from the hub's event stream.
///
/// The stream ends when the hub closes the connection; a transport failure
/// is yielded as an `Err` item.
pub type EventStream = BoxStream<'static, Result<String, HubError>>;

/// A scene as listed by the hub. Only used as a connectivity probe.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub info: SceneInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneInfo {
    #[serde(default)]
    pub name: String,
}

/// Access to the hub's device inventory and change notifications.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Full list of devices currently known to the hub.
    async fn fetch_all_devices(&self) -> Result<Vec<DeviceSnapshot>, HubError>;

    /// List of scenes. Cheap, used to validate the credential at startup.
    async fn fetch_scenes(&self) -> Result<Vec<Scene>, HubError>;

    /// Open the event stream.
    async fn events(&self) -> Result<EventStream, HubError>;
}
