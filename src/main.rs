//! pxy: forward HTTP/HTTPS proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server ──┬─ CONNECT ─▶ raw connection ─┐
//!                                                 │                             │
//!                                                 └─ other ───▶ hyper + Axum ───┤
//!                                                                               ▼
//!                                                         proxy::dispatch (auth gate)
//!                                                              │            │
//!                                                              ▼            ▼
//!                                                       proxy::tunnel  proxy::forward
//!                                                              │            │
//!                                                              ▼            ▼
//!                                                        proxy::relay  proxy::transport ──▶ Origin
//! ```

use clap::Parser;

use pxy::config::Cli;
use pxy::lifecycle::{signals, Shutdown};
use pxy::net::Listener;
use pxy::observability::logging;
use pxy::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().load()?;

    logging::init(&config.observability);

    tracing::info!("pxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        auth_enabled = config.auth.encoded_credential().is_some(),
        "Configuration loaded"
    );

    let listener = Listener::bind(&config.listener).await?;
    let addr = listener.local_addr()?;
    tracing::info!("listening on {addr}");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
