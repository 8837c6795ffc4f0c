//! Server assembly: wires the orchestration core to the HTTP router and
//! runs it with graceful shutdown.

mod config;

pub use config::ServerConfig;

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atrium_core::{
    metrics, EventBus, MetricsCache, SimulatedExecutor, TaskTracker, TerminalConfig,
    TerminalManager, WatchManager,
};

use crate::websocket::ConnectionHub;

/// Event bus capacity. Slow WebSocket subscribers beyond this many
/// buffered events start dropping (lagged) instead of blocking publishers.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Run the server until shutdown.
pub async fn run(config: ServerConfig) -> Result<()> {
    let workspace = config
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| config.workspace.clone());
    info!(workspace = %workspace.display(), "Workspace root resolved");

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let metrics_cache = Arc::new(MetricsCache::new());
    let terminals = Arc::new(TerminalManager::new(
        bus.clone(),
        TerminalConfig {
            shell: config.resolved_shell(),
            cwd: Some(workspace.clone()),
            max_sessions: config.max_terminals,
        },
    ));
    let watches = Arc::new(WatchManager::new(bus.clone()));
    let tasks = TaskTracker::new(
        bus.clone(),
        Arc::new(SimulatedExecutor::new(Duration::from_secs(
            config.task_delay_secs,
        ))),
    );
    let hub = Arc::new(ConnectionHub::new(
        bus.clone(),
        Arc::clone(&terminals),
        Arc::clone(&watches),
        tasks.clone(),
        Arc::clone(&metrics_cache),
        workspace.clone(),
    ));

    let sampler = metrics::spawn_sampler(
        Arc::clone(&metrics_cache),
        bus.clone(),
        Duration::from_secs(config.metrics_interval_secs),
    );

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/", get(|| async { "Atrium workspace server" }))
        .merge(crate::api::api_router())
        .merge(crate::websocket::websocket_router())
        .layer(Extension(Arc::clone(&hub)))
        .layer(Extension(tasks))
        .layer(Extension(Arc::clone(&metrics_cache)))
        .layer(Extension(Arc::new(config.clone())))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Releasing live connections and sessions...");
    sampler.abort();
    hub.shutdown().await;

    info!("Atrium shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal");
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
