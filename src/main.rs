//! Atrium — real-time workspace server.
//!
//! Entry point: loads configuration, initializes logging and runs the
//! HTTP/WebSocket server.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod server;
mod websocket;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atrium=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = server::ServerConfig::parse();
    info!(
        "Starting Atrium workspace server v{}",
        env!("CARGO_PKG_VERSION")
    );

    server::run(config).await
}
