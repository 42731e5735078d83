//! Admin API: authenticated, read-only introspection of live connections.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use crate::transport::server::SyncServer;
use self::auth::admin_auth_middleware;
use self::handlers::*;

pub fn admin_router(server: SyncServer) -> Router<SyncServer> {
    Router::new()
        .route("/admin/connections", get(list_connections))
        .route("/admin/connections/{id}", get(get_connection))
        .route("/admin/guard", get(get_guard))
        .route_layer(middleware::from_fn_with_state(server, admin_auth_middleware))
}
