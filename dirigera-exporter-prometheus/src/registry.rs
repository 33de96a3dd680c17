//! The device registry and its reconciliation against the hub.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use dirigera_common::{DevicePatch, DeviceSnapshot};
use dirigera_hub::{HubError, HubTransport};

use crate::classifier::AttributeClassifier;
use crate::error::{ExporterError, RecordError, Result};
use crate::events::{DeviceEvent, decode_event};
use crate::exposition::SharedMetrics;
use crate::namespace::SharedNamespace;
use crate::record::DeviceMetric;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// Devices whose record could not be created.
    pub skipped: usize,
}

/// Registry handle shared by the event pump and the HTTP handlers.
///
/// Every mutation goes through this lock, so reconciliations and event
/// handling never interleave.
pub type SharedRegistry = Arc<tokio::sync::Mutex<DeviceRegistry>>;

/// Owns the device records and keeps them in sync with the hub.
pub struct DeviceRegistry {
    transport: Arc<dyn HubTransport>,
    namespace: SharedNamespace,
    classifier: AttributeClassifier,
    metrics: SharedMetrics,
    devices: HashMap<String, DeviceMetric>,
}

impl DeviceRegistry {
    pub fn new(
        transport: Arc<dyn HubTransport>,
        namespace: SharedNamespace,
        classifier: AttributeClassifier,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            transport,
            namespace,
            classifier,
            metrics,
            devices: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &SharedNamespace {
        &self.namespace
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn transport(&self) -> &Arc<dyn HubTransport> {
        &self.transport
    }

    /// Number of device records.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&DeviceMetric> {
        self.devices.get(id)
    }

    /// Ids of the device records, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Check that the hub accepts the credentials by listing its scenes.
    pub async fn probe(&self) -> Result<usize> {
        let scenes = self.transport.fetch_scenes().await?;
        debug!(scenes = scenes.len(), "Hub probe succeeded");
        Ok(scenes.len())
    }

    /// Load the full device list for the first time.
    ///
    /// Transport failures are returned as is; the caller is expected to
    /// abort startup.
    pub async fn initialize(&mut self) -> Result<ReconcileSummary> {
        let snapshots = self.transport.fetch_all_devices().await?;
        let summary = self.apply_snapshot(snapshots);

        info!(
            devices = self.devices.len(),
            series = self.namespace.len(),
            skipped = summary.skipped,
            "Device registry initialized"
        );
        Ok(summary)
    }

    /// Fetch the device list and bring the records in line with it.
    ///
    /// On transport failure the records are left as they are and the
    /// failure is counted in `ws_failures_total`.
    pub async fn reconcile(&mut self) -> Result<ReconcileSummary> {
        let snapshots = match self.transport.fetch_all_devices().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                self.metrics.inc_ws_failures();
                return Err(self.transport_failure(e));
            }
        };

        self.metrics.inc_updates();
        let summary = self.apply_snapshot(snapshots);
        debug!(
            created = summary.created,
            updated = summary.updated,
            removed = summary.removed,
            skipped = summary.skipped,
            "Reconciled devices"
        );
        Ok(summary)
    }

    fn transport_failure(&self, err: HubError) -> ExporterError {
        let err = ExporterError::from(err);
        error!(error = %err, "Failed to fetch devices from the hub");
        err
    }

    /// Create, update and remove records so that the registry holds exactly
    /// the devices of `snapshots`.
    ///
    /// Devices whose record cannot be created are skipped; they are tried
    /// again on the next pass.
    pub fn apply_snapshot(&mut self, snapshots: Vec<DeviceSnapshot>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let fresh: HashSet<String> = snapshots.iter().map(|d| d.id.clone()).collect();

        for snapshot in snapshots {
            match self.devices.get_mut(&snapshot.id) {
                Some(record) => match record.update(snapshot) {
                    Ok(()) => summary.updated += 1,
                    Err(e) => error!(error = %e, "Failed to update device metrics"),
                },
                None => {
                    if self.insert(snapshot) {
                        summary.created += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
        }

        let gone: Vec<String> = self
            .devices
            .keys()
            .filter(|id| !fresh.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            if self.remove(&id) {
                summary.removed += 1;
            }
        }

        self.metrics.set_devices(self.devices.len());
        summary
    }

    /// Create the record of a new device. Returns `false` if the device was
    /// skipped.
    fn insert(&mut self, snapshot: DeviceSnapshot) -> bool {
        let id = snapshot.id.clone();
        match DeviceMetric::new(snapshot, self.namespace.clone(), &self.classifier) {
            Ok(record) => {
                self.devices.insert(id, record);
                true
            }
            Err(e) => {
                warn!(device_id = %id, error = %e, "Skipping device");
                false
            }
        }
    }

    /// Unregister and drop the record of a device. Returns `false` if the
    /// device was unknown.
    fn remove(&mut self, id: &str) -> bool {
        match self.devices.remove(id) {
            Some(mut record) => {
                record.unregister();
                true
            }
            None => false,
        }
    }

    /// Handle one raw event frame from the hub.
    ///
    /// Nothing here can fail: malformed or irrelevant frames are logged and
    /// dropped so a bad event never stops the stream.
    pub fn handle_message(&mut self, message: &str) {
        self.metrics.inc_updates();

        match decode_event(message) {
            Ok(Some(event)) => self.handle_event(event),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring malformed event"),
        }
    }

    /// Apply a decoded device event.
    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Added(snapshot) => {
                let id = snapshot.id.clone();
                if let Some(record) = self.devices.get_mut(&id) {
                    debug!(device_id = %id, "Device added twice, updating it");
                    if let Err(e) = record.update(snapshot) {
                        error!(error = %e, "Failed to update device metrics");
                    }
                } else {
                    self.insert(snapshot);
                }
            }
            DeviceEvent::Removed { id } => {
                if !self.remove(&id) {
                    debug!(device_id = %id, "Removal of an unknown device");
                }
            }
            DeviceEvent::Changed(patch) => self.apply_patch(&patch),
        }

        self.metrics.set_devices(self.devices.len());
    }

    fn apply_patch(&mut self, patch: &DevicePatch) {
        let Some(record) = self.devices.get_mut(&patch.id) else {
            warn!(
                device_id = %patch.id,
                "Update for an unknown device, waiting for the next reconciliation"
            );
            return;
        };

        match record.apply_patch(patch, self.classifier.catalog()) {
            Ok(()) => debug!(device_id = %patch.id, "Applied device update"),
            Err(RecordError::Patch(e)) => warn!(error = %e, "Rejected device update"),
            Err(e) => error!(error = %e, "Failed to update device metrics"),
        }
    }

    /// Unregister every record.
    pub fn clear(&mut self) {
        for (_, mut record) in self.devices.drain() {
            record.unregister();
        }
        self.metrics.set_devices(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::ExporterMetrics;
    use crate::namespace::MetricNamespace;
    use async_trait::async_trait;
    use dirigera_hub::{EventStream, Scene};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Transport returning a configurable device list.
    #[derive(Default)]
    struct StaticTransport {
        devices: Mutex<Vec<DeviceSnapshot>>,
        fail_with_auth: Mutex<bool>,
    }

    #[async_trait]
    impl HubTransport for StaticTransport {
        async fn fetch_all_devices(&self) -> std::result::Result<Vec<DeviceSnapshot>, HubError> {
            if *self.fail_with_auth.lock() {
                return Err(HubError::Authentication { status: 401 });
            }
            Ok(self.devices.lock().clone())
        }

        async fn fetch_scenes(&self) -> std::result::Result<Vec<Scene>, HubError> {
            Ok(Vec::new())
        }

        async fn events(&self) -> std::result::Result<EventStream, HubError> {
            Err(HubError::WebSocket("no events".into()))
        }
    }

    fn device(id: &str, name: &str) -> DeviceSnapshot {
        DeviceSnapshot::from_json(json!({
            "id": id,
            "type": "outlet",
            "deviceType": "outlet",
            "attributes": {"customName": name, "isOn": true},
            "room": {"id": "r1", "name": "Office"}
        }))
        .unwrap()
    }

    fn registry(transport: Arc<StaticTransport>) -> DeviceRegistry {
        DeviceRegistry::new(
            transport,
            Arc::new(MetricNamespace::new()),
            AttributeClassifier::default(),
            Arc::new(ExporterMetrics::new("hub")),
        )
    }

    #[tokio::test]
    async fn test_initialize() {
        let transport = Arc::new(StaticTransport::default());
        *transport.devices.lock() = vec![device("a", "Printer"), device("b", "Fan")];
        let mut registry = registry(transport);

        let summary = registry.initialize().await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(registry.device_ids(), vec!["a", "b"]);
        assert_eq!(registry.metrics().devices(), 2);
    }

    #[tokio::test]
    async fn test_initialize_auth_failure() {
        let transport = Arc::new(StaticTransport::default());
        *transport.fail_with_auth.lock() = true;
        let mut registry = registry(transport);

        let err = registry.initialize().await.unwrap_err();
        assert!(matches!(err, ExporterError::Authentication(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_converges() {
        let transport = Arc::new(StaticTransport::default());
        *transport.devices.lock() = vec![device("a", "Printer"), device("b", "Fan")];
        let mut registry = registry(transport.clone());
        registry.initialize().await.unwrap();

        *transport.devices.lock() = vec![device("b", "Fan"), device("c", "Heater")];
        let summary = registry.reconcile().await.unwrap();

        assert_eq!(
            summary,
            ReconcileSummary {
                created: 1,
                updated: 1,
                removed: 1,
                skipped: 0
            }
        );
        assert_eq!(registry.device_ids(), vec!["b", "c"]);
        assert!(!registry.namespace().contains("office_printer_outlet_is_on"));
        assert!(registry.namespace().contains("office_heater_outlet_is_on"));
        assert_eq!(registry.metrics().devices(), 2);
        assert_eq!(registry.metrics().updates(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_failure_keeps_state() {
        let transport = Arc::new(StaticTransport::default());
        *transport.devices.lock() = vec![device("a", "Printer")];
        let mut registry = registry(transport.clone());
        registry.initialize().await.unwrap();
        let series = registry.namespace().len();

        *transport.fail_with_auth.lock() = true;
        let err = registry.reconcile().await.unwrap_err();

        assert!(matches!(err, ExporterError::Authentication(_)));
        assert_eq!(registry.device_ids(), vec!["a"]);
        assert_eq!(registry.namespace().len(), series);
        assert_eq!(registry.metrics().ws_failures(), 1);
    }

    #[test]
    fn test_unknown_device_type_is_skipped() {
        let mut registry = registry(Arc::new(StaticTransport::default()));
        let toaster = DeviceSnapshot::from_json(json!({
            "id": "t1",
            "type": "toaster",
            "deviceType": "toaster",
            "attributes": {"customName": "Toaster"}
        }))
        .unwrap();

        let summary = registry.apply_snapshot(vec![toaster, device("a", "Printer")]);

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(registry.device_ids(), vec!["a"]);
    }

    #[test]
    fn test_handle_state_change() {
        let mut registry = registry(Arc::new(StaticTransport::default()));
        registry.apply_snapshot(vec![device("a", "Printer")]);

        registry.handle_message(
            &json!({
                "source": "urn:com:ikea:homesmart:iotc:zigbee",
                "type": "deviceStateChanged",
                "data": {"id": "a", "attributes": {"currentActivePower": 12.5}}
            })
            .to_string(),
        );

        assert_eq!(
            registry
                .namespace()
                .value_of("office_printer_outlet_current_active_power"),
            Some(crate::namespace::SeriesValue::Gauge(Some(12.5)))
        );
        assert_eq!(registry.metrics().updates(), 1);
    }

    #[test]
    fn test_handle_update_for_unknown_device() {
        let mut registry = registry(Arc::new(StaticTransport::default()));
        registry.apply_snapshot(vec![device("a", "Printer")]);
        let before = registry.namespace().names();

        registry.handle_message(
            r#"{"source": "zigbee", "type": "deviceStateChanged", "data": {"id": "zz", "isReachable": false}}"#,
        );

        assert_eq!(registry.namespace().names(), before);
        assert_eq!(registry.device_ids(), vec!["a"]);
    }

    #[test]
    fn test_malformed_messages_are_ignored() {
        let mut registry = registry(Arc::new(StaticTransport::default()));
        registry.apply_snapshot(vec![device("a", "Printer")]);

        registry.handle_message("not json");
        registry.handle_message(r#"{"type": "deviceAdded"}"#);
        registry.handle_message(r#"{"source": "zigbee", "type": "deviceAdded", "data": {"id": 3}}"#);

        assert_eq!(registry.device_ids(), vec!["a"]);
        assert_eq!(registry.metrics().updates(), 3);
    }

    #[test]
    fn test_clear() {
        let mut registry = registry(Arc::new(StaticTransport::default()));
        registry.apply_snapshot(vec![device("a", "Printer"), device("b", "Fan")]);

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.namespace().is_empty());
        assert_eq!(registry.metrics().devices(), 0);
    }
}
