//! Process-wide metrics and rendering of the exposition text.

use std::sync::Arc;
use std::time::Instant;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::metrics::info::Info;
use prometheus_client::registry::Registry;
use tracing::trace;

use crate::error::ExporterError;
use crate::namespace::MetricNamespace;

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Counters and timings of the bridge itself.
#[derive(Debug)]
pub struct ExporterMetrics {
    registry: Registry,
    devices: Gauge,
    updates: Counter,
    ws_failures: Counter,
    export_seconds: Histogram,
}

/// Create a shareable metrics handle.
pub type SharedMetrics = Arc<ExporterMetrics>;

impl ExporterMetrics {
    /// Build the registry. `hub` is the hub address reported in the
    /// gateway info series.
    pub fn new(hub: &str) -> Self {
        let mut registry = Registry::default();

        let gateway = Info::new(vec![
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("hub".to_string(), hub.to_string()),
        ]);
        registry.register(
            "dirigera_prometheus_gateway",
            "Prometheus exporter for the devices of an IKEA Dirigera hub",
            gateway,
        );

        let devices = Gauge::default();
        registry.register(
            "devices_counter",
            "The total number of devices registered to the exporter",
            devices.clone(),
        );

        let updates = Counter::default();
        registry.register(
            "updates",
            "The total number of updates since the last reboot of this system",
            updates.clone(),
        );

        let ws_failures = Counter::default();
        registry.register(
            "ws_failures",
            "The total number of failures since the last reboot of this system",
            ws_failures.clone(),
        );

        let export_seconds = Histogram::new(exponential_buckets(0.0005, 2.0, 12));
        registry.register(
            "metric_export_seconds",
            "Histogram of the metrics generation",
            export_seconds.clone(),
        );

        Self {
            registry,
            devices,
            updates,
            ws_failures,
            export_seconds,
        }
    }

    pub fn set_devices(&self, count: usize) {
        self.devices.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn devices(&self) -> i64 {
        self.devices.get()
    }

    pub fn inc_updates(&self) {
        self.updates.inc();
    }

    pub fn updates(&self) -> u64 {
        self.updates.get()
    }

    pub fn inc_ws_failures(&self) {
        self.ws_failures.inc();
    }

    pub fn ws_failures(&self) -> u64 {
        self.ws_failures.get()
    }

    /// Render the device series followed by the process metrics, ending
    /// with `# EOF`. The duration of each call is observed in
    /// `metric_export_seconds`.
    pub fn render(&self, namespace: &MetricNamespace) -> Result<String, ExporterError> {
        let start = Instant::now();
        let mut output = String::with_capacity(namespace.len() * 160 + 1024);

        namespace
            .encode(&mut output)
            .map_err(|e| ExporterError::Render(e.to_string()))?;
        encode(&mut output, &self.registry).map_err(|e| ExporterError::Render(e.to_string()))?;

        let elapsed = start.elapsed().as_secs_f64();
        self.export_seconds.observe(elapsed);
        trace!(bytes = output.len(), elapsed, "Rendered metrics");

        Ok(output)
    }
}
