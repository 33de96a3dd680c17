//! Startup sequence: reach the hub, load the devices, then bind the HTTP port.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use dirigera_hub::HubTransport;

use crate::classifier::AttributeClassifier;
use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::exposition::{ExporterMetrics, SharedMetrics};
use crate::http::{AppState, HttpServer};
use crate::namespace::MetricNamespace;
use crate::registry::{DeviceRegistry, SharedRegistry};

/// A loaded registry and its bound, not yet serving, HTTP server.
pub struct Exporter {
    pub registry: SharedRegistry,
    pub metrics: SharedMetrics,
    pub server: HttpServer,
}

/// Reach the hub, load its devices and bind the listen address, in that
/// order. Nothing is bound when the hub cannot be used.
pub async fn start(
    transport: Arc<dyn HubTransport>,
    config: &ExporterConfig,
) -> Result<Exporter, ExporterError> {
    let listen_addr: SocketAddr = config
        .http
        .listen
        .parse()
        .map_err(|e| ExporterError::Config(format!("Invalid listen address: {}", e)))?;

    let namespace = Arc::new(MetricNamespace::new());
    let metrics = Arc::new(ExporterMetrics::new(&config.hub.address));
    let mut registry = DeviceRegistry::new(
        transport,
        namespace.clone(),
        AttributeClassifier::default(),
        metrics.clone(),
    );

    registry.probe().await?;
    let summary = registry.initialize().await?;
    info!(devices = summary.created, skipped = summary.skipped, "Loaded devices from the hub");

    let registry: SharedRegistry = Arc::new(tokio::sync::Mutex::new(registry));
    let state = AppState {
        registry: registry.clone(),
        namespace,
        metrics: metrics.clone(),
        mode: config.sync.mode,
        security_contact: config.http.security_contact.as_deref().map(Arc::from),
    };
    let server = HttpServer::bind(state, config.http.clone(), listen_addr).await?;

    Ok(Exporter {
        registry,
        metrics,
        server,
    })
}
