//! Built-in handlers.

pub mod logging;

pub use logging::{LoggingHandler, LoggingHandlerFactory};
