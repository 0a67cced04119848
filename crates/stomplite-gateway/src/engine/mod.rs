//! Per-connection STOMP engine.
//!
//! One [`StompConnection`] per physical connection, run on its own task:
//! admission guard, CONNECT negotiation, command dispatch, heartbeat monitors
//! and the single close path all execute on that task, so the engine holds no
//! locks.

mod connection;
mod handle;
mod session;

pub use connection::{CloseReason, StompConnection};
pub use handle::ConnectionHandle;
pub use session::{ConnectionSession, SessionState};
