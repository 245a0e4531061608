//! Router assembly, mirroring the teacher's
//! `orchestrator::api::routes::create_router` shape: one function building
//! a `Router` over a shared [`AppState`], with tracing and CORS layered on
//! the same way `orchestrator-server.rs` does for its own router.

use crate::handlers;
use crate::state::AppState;
use crate::ws;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", post(handlers::command_post))
        .route("/api/COMMAND/:node", get(handlers::command_get_bare))
        .route("/api/COMMAND/:node/*args", get(handlers::command_get_with_args))
        .route("/ws", get(ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
