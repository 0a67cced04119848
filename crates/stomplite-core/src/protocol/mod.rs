//! STOMP 1.2 protocol modules.
//!
//! - `frame`: command/headers/body value type, builders and the encoder.
//! - `heartbeat`: the `x,y` keep-alive pair and the negotiation rule.
//! - `codec`: streaming decoder with configurable size/count limits.
//!
//! All parsers are panic-free: malformed input is reported as `StompError`
//! instead of panicking or indexing raw buffers.

pub mod codec;
pub mod frame;
pub mod heartbeat;
