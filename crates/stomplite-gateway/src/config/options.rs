//! Runtime view of the `stomp` config section, shared by every connection.

use std::time::Duration;

use stomplite_core::{CodecLimits, Heartbeat};

use super::schema::{AuthMode, StompSection};

#[derive(Debug, Clone)]
pub struct StompOptions {
    pub max_connect_frame_length: usize,
    pub limits: CodecLimits,
    pub heartbeat: Heartbeat,
    pub trailing_line: bool,
    pub debug: bool,
    pub auth_mode: AuthMode,
    pub auth_timeout: Option<Duration>,
    pub outbound_queue: usize,
}

impl Default for StompOptions {
    fn default() -> Self {
        Self::from(&StompSection::default())
    }
}

impl From<&StompSection> for StompOptions {
    fn from(s: &StompSection) -> Self {
        Self {
            max_connect_frame_length: s.max_connect_frame_length,
            limits: CodecLimits {
                max_header_length: s.max_header_length,
                max_headers: s.max_headers,
                max_body_length: s.max_body_length,
            },
            heartbeat: s.heartbeat,
            trailing_line: s.trailing_line,
            debug: s.debug,
            auth_mode: s.auth_mode,
            auth_timeout: (s.auth_timeout_ms > 0).then(|| Duration::from_millis(s.auth_timeout_ms)),
            outbound_queue: s.outbound_queue,
        }
    }
}
