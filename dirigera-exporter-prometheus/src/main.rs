//! Prometheus exporter for the devices of an IKEA Dirigera hub.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{error, info, warn};

use dirigera_common::init_tracing;
use dirigera_exporter_prometheus::{
    EventPump, Exporter, ExporterConfig, ReconnectConfig, SyncMode, start,
};
use dirigera_hub::{HubClient, HubTransport};

/// Prometheus exporter for the devices of an IKEA Dirigera hub.
#[derive(Parser, Debug)]
#[command(name = "dirigera-exporter-prometheus")]
#[command(about = "Export the devices of an IKEA Dirigera hub as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Hostname or IP address of the hub (overrides config).
    #[arg(long)]
    remote: Option<String>,

    /// Hostname clients use to reach the exporter (overrides config).
    #[arg(long)]
    hostname: Option<String>,

    /// Access token of the hub (overrides config).
    #[arg(long, env = "DIRIGERA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Path prefix of every route (overrides config).
    #[arg(long)]
    webpath: Option<String>,

    /// Public URL of the exporter behind a reverse proxy (overrides config).
    #[arg(long)]
    url: Option<String>,

    /// Synchronization mode (overrides config).
    #[arg(long, value_enum)]
    mode: Option<SyncMode>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(remote) = self.remote {
            config.hub.address = remote;
        }
        if let Some(hostname) = self.hostname {
            config.http.hostname = hostname;
        }
        if let Some(token) = self.token {
            config.hub.token = SecretString::from(token);
        }
        if let Some(listen) = self.listen {
            config.http.listen = listen;
        }
        if let Some(webpath) = self.webpath {
            config.http.webpath = webpath;
        }
        if let Some(url) = self.url {
            config.http.public_url = Some(url);
        }
        if let Some(mode) = self.mode {
            config.sync.mode = mode;
        }

        match self.verbose {
            0 => {
                if let Some(level) = self.log_level {
                    config.logging.level = level;
                }
            }
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!(
        hub = %config.hub.address,
        mode = ?config.sync.mode,
        "Starting Dirigera Prometheus Exporter"
    );

    // Connect to the hub and load the devices before serving anything
    let client = HubClient::new(&config.hub.settings())?;
    let transport: Arc<dyn HubTransport> = Arc::new(client);
    let Exporter {
        registry,
        metrics,
        server,
    } = start(transport, &config)
        .await
        .context("Failed to start, check the hub address and the token")?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Follow the hub events
    let pump_task = match config.sync.mode {
        SyncMode::Events => {
            let pump = EventPump::new(registry.clone(), ReconnectConfig::from(&config.sync)).await;
            Some(tokio::spawn(pump.run(shutdown_rx.clone())))
        }
        SyncMode::Poll => None,
    };

    // Start HTTP server
    let mut http_task = tokio::spawn(server.run(shutdown_rx.clone()));

    // Wait for shutdown signal, or for the server to stop on its own
    let early_exit = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut http_task => Some(result),
    };

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        if let Some(task) = pump_task {
            let _ = task.await;
        }
        if early_exit.is_none() {
            let _ = http_task.await;
        }
    })
    .await;

    info!(
        devices = metrics.devices(),
        updates = metrics.updates(),
        ws_failures = metrics.ws_failures(),
        "Final statistics"
    );

    match early_exit {
        Some(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error");
            Err(e)
        }
        Some(Err(e)) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
        _ => {
            info!("Exporter stopped");
            Ok(())
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
