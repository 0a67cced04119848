//! Axum router wiring (HTTP -> WS upgrade, ops endpoints).

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let ws_path = state.cfg().server.websocket_path.clone();
    Router::new()
        .route(&ws_path, get(transport::ws::ws_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
