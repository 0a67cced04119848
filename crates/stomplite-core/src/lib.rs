//! stomplite core: transport-agnostic STOMP 1.2 primitives and error types.
//!
//! This crate defines the frame model, the heartbeat value and negotiator, and
//! the streaming frame codec shared by the gateway and its tests. It carries no
//! transport or runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `StompError`/`Result` so a hostile peer
//! cannot crash the process with malformed input.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, Result, StompError};
pub use protocol::codec::{CodecLimits, FrameDecoder};
pub use protocol::frame::{Command, Credentials, Frame, Headers};
pub use protocol::heartbeat::{Heartbeat, Negotiated};
