//! stomplite gateway library entry.
//!
//! Wires the per-connection STOMP engine to its transports (axum WebSocket,
//! in-memory), the application handler seam, config loading and the ops
//! endpoints. Consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;

pub use dispatch::{AuthRequest, StompServerHandler, StompServerHandlerFactory};
pub use engine::{CloseReason, ConnectionHandle, ConnectionSession, SessionState, StompConnection};
pub use transport::Transport;
