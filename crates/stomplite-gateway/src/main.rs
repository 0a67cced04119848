//! stomplite gateway binary.
//!
//! - STOMP 1.2 over WebSocket on `server.websocket_path`
//! - `/healthz`, `/metrics`
//! - Config path: first argument, else `STOMPLITE_CONFIG`, else `stomplite.yaml`

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use stomplite_core::error::{Result, StompError};
use stomplite_gateway::{app_state, config, router, services::LoggingHandlerFactory};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "stomplite-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STOMPLITE_CONFIG").ok())
        .unwrap_or_else(|| "stomplite.yaml".to_string());

    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg.server.listen.parse().map_err(|e| {
        StompError::Config(format!("server.listen must be a valid SocketAddr: {e}"))
    })?;
    let ws_path = cfg.server.websocket_path.clone();

    let state = app_state::AppState::new(cfg, Arc::new(LoggingHandlerFactory))?;
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| StompError::Transport(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, path = %ws_path, config = %path, "stomplite-gateway starting");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| StompError::Transport(format!("server failed: {e}")))
}
