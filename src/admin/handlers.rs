use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::guard::{ConnectionId, GuardStats};
use crate::transport::connection::ConnectionInfo;
use crate::transport::server::SyncServer;

pub async fn list_connections(State(server): State<SyncServer>) -> Json<Vec<ConnectionInfo>> {
    Json(server.connections())
}

pub async fn get_connection(
    State(server): State<SyncServer>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionInfo>, StatusCode> {
    let id: ConnectionId = id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    server
        .connection(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_guard(State(server): State<SyncServer>) -> Json<GuardStats> {
    Json(server.guard_stats())
}
