//! State sync server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  STATE SYNC SERVER                │
//!                      │                                                   │
//!     WebSocket client │  ┌──────────┐   ┌───────────┐   ┌────────────┐   │
//!     ─────────────────┼─▶│ listener │──▶│ websocket │──▶│ SyncServer │   │
//!                      │  │ (retry)  │   │   task    │   │  on_*      │   │
//!                      │  └──────────┘   └─────▲─────┘   └─────┬──────┘   │
//!                      │                       │ Outbound      │          │
//!     ◀────────────────┼───────────────────────┘               ▼          │
//!                      │                               ┌──────────────┐   │
//!                      │                               │ ServerEvent  │───┼──▶ subscribers
//!                      │                               │     bus      │   │
//!                      │                               └──────────────┘   │
//!                      │  ┌─────────────────────────────────────────────┐ │
//!                      │  │               Cross-Cutting Concerns         │ │
//!                      │  │  ┌────────┐ ┌───────┐ ┌──────────┐ ┌───────┐ │ │
//!                      │  │  │ config │ │ guard │ │ observa- │ │ admin │ │ │
//!                      │  │  │        │ │       │ │ bility   │ │       │ │ │
//!                      │  │  └────────┘ └───────┘ └──────────┘ └───────┘ │ │
//!                      │  └─────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use state_sync::config::{load_config, SyncConfig};
use state_sync::lifecycle::startup;
use state_sync::observability::logging;

#[derive(Parser)]
#[command(name = "state-sync")]
#[command(about = "Real-time state synchronization server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "state-sync starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        heartbeat_interval_ms = config.heartbeat.interval_ms,
        heartbeat_timeout_ms = config.heartbeat.timeout_ms,
        max_connections_per_source = config.limits.max_connections_per_source,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
