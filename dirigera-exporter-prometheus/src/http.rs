//! HTTP server for the metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{SecondsFormat, TimeDelta, Utc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info, warn};

use crate::config::{HttpConfig, SyncMode};
use crate::error::ExporterError;
use crate::exposition::{CONTENT_TYPE, SharedMetrics};
use crate::namespace::SharedNamespace;
use crate::registry::SharedRegistry;

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; base-uri 'none'; sandbox ; \
     form-action 'none'; frame-ancestors 'none'; upgrade-insecure-requests; \
     require-trusted-types-for 'script'; trusted-types 'none'";

const PERMISSIONS_POLICY: &str = "accelerometer=(), ambient-light-sensor=(), autoplay=(), \
     battery=(), camera=(), display-capture=(), document-domain=(), encrypted-media=(), \
     execution-while-not-rendered=(), execution-while-out-of-viewport=(), fullscreen=(), \
     gamepad=(), geolocation=(), gyroscope=(), hid=(), identity-credentials-get=(), \
     idle-detection=(), local-fonts=(), magnetometer=(), microphone=(), midi=(), payment=(), \
     picture-in-picture=(), publickey-credentials-create=(), publickey-credentials-get=(), \
     screen-wake-lock=(), serial=(), speaker-selection=(), storage-access=(), usb=(), \
     web-share=(), xr-spatial-tracking=()";

const ROBOTS_TXT: &str = "# Stop all search engines from crawling this site\n\
                          User-agent: *\n\
                          Disallow: /\n";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub namespace: SharedNamespace,
    pub metrics: SharedMetrics,
    pub mode: SyncMode,
    pub security_contact: Option<Arc<str>>,
}

/// Host header check applied to every route.
#[derive(Clone)]
struct HostGuard {
    hostname: Arc<str>,
    trust_forwarded_host: bool,
}

impl HostGuard {
    /// The host the client asked for.
    fn requested_host<'a>(&self, request: &'a Request) -> Option<&'a str> {
        let headers = request.headers();
        let forwarded = self
            .trust_forwarded_host
            .then(|| headers.get("x-forwarded-host"))
            .flatten()
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim);

        forwarded
            .or_else(|| headers.get(header::HOST).and_then(|v| v.to_str().ok()))
            .or_else(|| request.uri().authority().map(|a| a.as_str()))
    }

    fn allows(&self, host: Option<&str>) -> bool {
        host.is_some_and(|h| h.eq_ignore_ascii_case(&self.hostname))
    }
}

async fn check_host(State(guard): State<HostGuard>, request: Request, next: Next) -> Response {
    let host = guard.requested_host(&request);
    if !guard.allows(host) {
        warn!(
            requested = host.unwrap_or_default(),
            expected = %guard.hostname,
            "Rejecting request for an unexpected hostname"
        );
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Create the HTTP router.
pub fn create_router(state: AppState, config: &HttpConfig) -> Router {
    let mut routes = Router::new()
        .route(&config.metrics_path, get(metrics_handler))
        .route("/robots.txt", get(robots_handler))
        .route("/health", get(health_handler));
    if state.security_contact.is_some() {
        routes = routes.route("/.well-known/security.txt", get(security_txt_handler));
    }
    let routes = routes.with_state(state);

    let webpath = config.normalized_webpath();
    let app = if webpath == "/" {
        routes
    } else {
        Router::new().nest(&webpath, routes)
    };

    let guard = HostGuard {
        hostname: Arc::from(config.hostname.as_str()),
        trust_forwarded_host: config.trust_forwarded_host,
    };

    app.layer(middleware::from_fn_with_state(guard, check_host))
        .layer(security_header(
            header::CONTENT_SECURITY_POLICY,
            CONTENT_SECURITY_POLICY,
        ))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::REFERRER_POLICY, "no-referrer"))
        .layer(security_header(
            HeaderName::from_static("permissions-policy"),
            PERMISSIONS_POLICY,
        ))
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

/// Handler for the metrics endpoint.
///
/// In poll mode the registry is reconciled first, under the registry lock,
/// so concurrent scrapes are serialized. A failed reconciliation fails the
/// scrape and leaves the registry as it was.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let rendered = match state.mode {
        SyncMode::Poll => {
            let mut registry = state.registry.lock().await;
            if let Err(e) = registry.reconcile().await {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::CONTENT_TYPE, TEXT_PLAIN)],
                    format!("{}\n", e),
                )
                    .into_response();
            }
            state.metrics.render(&state.namespace)
        }
        SyncMode::Events => state.metrics.render(&state.namespace),
    };

    match rendered {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

async fn robots_handler() -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], ROBOTS_TXT).into_response()
}

async fn security_txt_handler(State(state): State<AppState>) -> Response {
    let Some(contact) = state.security_contact else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let expires = (Utc::now() + TimeDelta::days(365)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let body = format!(
        "Contact: {}\nExpires: {}\nPreferred-Languages: en, fr\n",
        contact, expires
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// HTTP server bound to its listen address.
pub struct HttpServer {
    state: AppState,
    config: HttpConfig,
    listener: TcpListener,
}

impl HttpServer {
    /// Bind the listen address.
    pub async fn bind(
        state: AppState,
        config: HttpConfig,
        listen_addr: SocketAddr,
    ) -> Result<Self, ExporterError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ExporterError::Bind {
                addr: listen_addr,
                source,
            })?;

        Ok(Self {
            state,
            config,
            listener,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state, &self.config);
        let webpath = self.config.normalized_webpath();
        let addr = self.listener.local_addr()?;

        info!(
            addr = %addr,
            webpath = %webpath,
            path = %self.config.metrics_path,
            "HTTP server listening"
        );
        if let Some(url) = &self.config.public_url {
            info!(url = %url, "Exporter should be reachable through the reverse proxy");
        }

        // Run server with graceful shutdown
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                // Wait for shutdown signal
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
