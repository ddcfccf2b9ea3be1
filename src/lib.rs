// APM intake server
//
// Accepts agent telemetry over HTTP, checks it against per-route admission
// filters, decodes it into typed records and hands batches to a bounded
// publishing queue.
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - NDJSON streaming intake with per-document diagnostics
// - Single-payload legacy intake
// - gzip/deflate bodies with a decompressed size ceiling
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::http::{header, HeaderMap};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, MethodRouter};
use axum::{Json, Router};
use metrics::counter;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, info, warn};

pub mod augment;
pub mod batch;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod model;
pub mod publish;
pub mod routes;
pub mod stream_response;

mod init;

pub use config::RuntimeConfig;
pub use error::IntakeError;
pub use init::init_tracing;

use dispatch::Dispatcher;
use handlers::legacy::LegacyRoute;
use handlers::RouteState;
use middleware::apply_chain;
use model::metadata::metadata_schema;
use model::Schema;
use publish::{QueueReporter, Reporter};
use routes::{Protocol, RoutingTable, TierChains};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub reporter: Arc<dyn Reporter>,
    pub dispatcher: Arc<Dispatcher>,
    pub metadata_schema: Arc<dyn Schema>,
    pub max_unzipped_size: u64,
    pub augment_enabled: bool,
}

impl AppState {
    pub fn new(config: &RuntimeConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            dispatcher: Arc::new(Dispatcher::streaming()),
            metadata_schema: Arc::new(metadata_schema()),
            max_unzipped_size: config.request.max_unzipped_size,
            augment_enabled: config.request.augment_enabled,
        }
    }
}

/// Error type that implements IntoResponse
///
/// Renders `{"error": "..."}` for clients that accept JSON and the bare
/// message otherwise.
#[derive(Debug)]
pub struct AppError {
    error: IntakeError,
    json: bool,
}

impl AppError {
    pub fn new(error: IntakeError, request_headers: &HeaderMap) -> Self {
        Self::with_format(error, error::accepts_json(request_headers))
    }

    pub fn with_format(error: IntakeError, json: bool) -> Self {
        Self { error, json }
    }

    pub fn error(&self) -> &IntakeError {
        &self.error
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            error!(error = %self.error, "Request failed");
        } else {
            debug!(error = %self.error, status = status.as_u16(), "Request rejected");
        }
        counter!("apm_intake.request.errors", 1, "type" => self.error.error_type());

        if self.json {
            (status, Json(json!({ "error": self.error.to_string() }))).into_response()
        } else {
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.error.to_string(),
            )
                .into_response()
        }
    }
}

/// Build the router for `table`, one route per entry behind its tier's filters.
pub fn build_router(config: &RuntimeConfig, table: &RoutingTable, state: AppState) -> Router {
    let chains = TierChains::from_config(config);

    let mut router = Router::new();
    for entry in table.entries() {
        let route = RouteState::new(state.clone(), entry.tier);
        let handler: MethodRouter = match entry.protocol {
            Protocol::Health => any(handlers::health_check),
            Protocol::Streaming => any(handlers::streaming::handle_intake).with_state(route),
            Protocol::Legacy(family) => {
                any(handlers::legacy::handle_payload).with_state(LegacyRoute::new(route, family))
            }
        };
        let chain = chains.for_tier(entry.tier);
        router = router.route(
            entry.path,
            handler.layer(from_fn_with_state(chain, apply_chain)),
        );
    }

    router.layer(CatchPanicLayer::new())
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Resolve once `signal` fires, stopping the reporter first so requests
/// still draining observe "shutting down".
async fn stop_on_signal<F>(signal: F, reporter: Arc<QueueReporter>)
where
    F: std::future::Future<Output = ()>,
{
    signal.await;
    reporter.stop();
    info!("Publishing queue stopped, draining in-flight requests");
}

/// Entry point for the server (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    let addr = config.server.listen_addr.clone();

    let (reporter, receiver) =
        QueueReporter::new(config.queue.capacity, config.queue.processing_timeout());
    let reporter = Arc::new(reporter);
    let consumer = publish::spawn_consumer(receiver);
    info!(
        capacity = config.queue.capacity,
        processing_timeout_ms = config.queue.processing_timeout_ms,
        "Publishing queue ready"
    );

    let table = RoutingTable::standard();
    let state = AppState::new(&config, Arc::clone(&reporter) as Arc<dyn Reporter>);
    let app = build_router(&config, &table, state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("APM intake listening on http://{}", addr);
    info!("Routes:");
    for entry in table.entries() {
        info!("  {:<8} http://{}{}", entry.tier.as_str(), addr, entry.path);
    }
    if !config.rum.enabled {
        info!("RUM endpoints are disabled");
    }
    if config.auth.token().is_none() {
        warn!("No secret token configured, backend endpoints accept unauthenticated requests");
    }
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(stop_on_signal(shutdown_signal(), Arc::clone(&reporter)))
    .await
    .context("Server error")?;

    // Queued batches still drain once the last sender is gone.
    reporter.stop();
    drop(reporter);

    match consumer.await {
        Ok(events) => info!(events, "Server shutdown complete"),
        Err(e) => warn!(error = %e, "Publishing queue consumer failed"),
    }

    Ok(())
}
