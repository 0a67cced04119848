//! Application handler contract and command dispatch.
//!
//! Re-exports the handler traits so downstream consumers can depend on this
//! module directly.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::dispatch;
pub use handler::{AuthRequest, StompServerHandler, StompServerHandlerFactory};
