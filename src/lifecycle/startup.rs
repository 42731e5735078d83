//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics export
//! - Construct and start the server
//! - Hold the process until a shutdown signal, then close in order
//!
//! # Design Decisions
//! - Bind failures are retried inside `SyncServer::start`; only an
//!   exhausted retry budget is fatal
//! - Shutdown closes client sockets before the listener goes away

use std::net::SocketAddr;

use crate::config::SyncConfig;
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::metrics;
use crate::transport::{ServerError, SyncServer};

/// Run a server with `config` until SIGINT/SIGTERM.
pub async fn run(config: SyncConfig) -> Result<(), ServerError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = SyncServer::new(config);
    server.start().await?;

    shutdown_signal().await;
    tracing::info!("Shutting down");
    server.close().await;

    Ok(())
}
