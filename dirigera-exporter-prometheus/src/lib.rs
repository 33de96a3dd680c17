//! Prometheus exporter for the devices of an IKEA Dirigera hub.
//!
//! Every device known to the hub is mirrored as a set of typed metric
//! series: one gauge or state set per device attribute plus an info series
//! with its descriptive fields. The series are kept in sync with the hub
//! either by following the hub's event stream or by reconciling on every
//! scrape, and are exposed on an HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Dirigera hub   │────>│ Device registry │────>│   HTTP Server   │
//! │ (REST + events) │     │   (namespace)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! dirigera-exporter-prometheus --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod exposition;
pub mod http;
pub mod namespace;
pub mod naming;
pub mod record;
pub mod registry;
pub mod startup;
pub mod sync;

pub use classifier::{AttributeClassifier, AttributeKind};
pub use config::{ExporterConfig, SyncMode};
pub use error::{ExporterError, RecordError};
pub use exposition::{ExporterMetrics, SharedMetrics};
pub use http::{AppState, HttpServer};
pub use namespace::{MetricNamespace, SharedNamespace};
pub use record::DeviceMetric;
pub use registry::{DeviceRegistry, ReconcileSummary, SharedRegistry};
pub use startup::{Exporter, start};
pub use sync::{EventPump, ReconnectConfig};
