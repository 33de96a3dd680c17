//! Background task feeding hub events into the registry.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use dirigera_hub::{EventStream, HubTransport};

use crate::config::SyncConfig;
use crate::exposition::SharedMetrics;
use crate::registry::SharedRegistry;

/// Exponential backoff configuration for event stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&SyncConfig> for ReconnectConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(config.reconnect_initial_delay_secs),
            max_delay: Duration::from_secs(config.reconnect_max_delay_secs),
        }
    }
}

/// How a stream session ended.
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(String),
}

/// Keeps the registry current by following the hub's event stream.
pub struct EventPump {
    registry: SharedRegistry,
    transport: Arc<dyn HubTransport>,
    metrics: SharedMetrics,
    reconnect: ReconnectConfig,
}

impl EventPump {
    pub async fn new(registry: SharedRegistry, reconnect: ReconnectConfig) -> Self {
        let (transport, metrics) = {
            let registry = registry.lock().await;
            (registry.transport().clone(), registry.metrics().clone())
        };

        Self {
            registry,
            transport,
            metrics,
            reconnect,
        }
    }

    /// Follow the event stream until the shutdown signal is received.
    ///
    /// Every lost connection is counted as a failure, retried with
    /// exponential backoff, and followed by a full reconciliation to catch
    /// up with events missed while disconnected.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        let mut reconnecting = false;

        loop {
            match self.transport.events().await {
                Ok(stream) => {
                    if reconnecting {
                        self.catch_up().await;
                    }
                    attempt = 0;

                    match self.consume(stream, &mut shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => {
                            warn!("Hub event stream closed");
                            self.metrics.inc_ws_failures();
                        }
                        SessionEnd::Failed(e) => {
                            warn!(error = %e, "Hub event stream failed");
                            self.metrics.inc_ws_failures();
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Failed to connect to the hub event stream");
                    self.metrics.inc_ws_failures();
                }
            }

            let delay = calculate_backoff(attempt, &self.reconnect);
            attempt = attempt.saturating_add(1);
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting to the hub event stream");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
            reconnecting = true;
        }

        info!("Event pump stopped");
    }

    async fn consume(
        &self,
        mut stream: EventStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        self.registry.lock().await.handle_message(&text);
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    async fn catch_up(&self) {
        match self.registry.lock().await.reconcile().await {
            Ok(summary) => debug!(?summary, "Caught up after reconnection"),
            Err(e) => warn!(error = %e, "Reconciliation after reconnection failed"),
        }
    }
}

/// Resolve once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, with a deterministic
/// jitter of +-25% derived from the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(30) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * ((attempt as f64 * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}
