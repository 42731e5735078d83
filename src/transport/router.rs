//! HTTP routes served alongside the WebSocket endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::admin::admin_router;
use crate::transport::server::{ServerState, SyncServer};
use crate::transport::websocket::ws_handler;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(flatten)]
    pub state: ServerState,
    pub connections: usize,
}

/// Build the application router: WebSocket upgrade path, health and status
/// probes, and the admin API when enabled.
pub fn build_router(server: SyncServer) -> Router {
    let config = server.config();
    let mut router = Router::new()
        .route(&config.listener.path, get(ws_handler))
        .route("/health", get(health))
        .route("/status", get(status));

    if config.admin.enabled {
        router = router.merge(admin_router(server.clone()));
    }

    router
        .with_state(server)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(server): State<SyncServer>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        state: server.state(),
        connections: server.connection_count(),
    })
}
