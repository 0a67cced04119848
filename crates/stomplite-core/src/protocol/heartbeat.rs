//! STOMP heart-beat value (`"<x>,<y>"`) and the negotiation rule.

use std::fmt;

use serde::Deserialize;

/// `(x, y)` keep-alive pair in milliseconds: `x` is how often the declaring
/// side can send, `y` how often it wants to receive. `0` disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Heartbeat {
    pub x: u64,
    pub y: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(30_000, 30_000)
    }
}

impl Heartbeat {
    /// Both directions disabled.
    pub const NONE: Heartbeat = Heartbeat { x: 0, y: 0 };

    pub fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }

    /// Parse a header value. Absent or malformed values are `(0,0)`.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::NONE;
        };
        let Some((x, y)) = value.split_once(',') else {
            return Self::NONE;
        };
        match (x.trim().parse::<u64>(), y.trim().parse::<u64>()) {
            (Ok(x), Ok(y)) => Self { x, y },
            _ => Self::NONE,
        }
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Effective keep-alive periods for one connection. `0` disables a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// How often the server must emit traffic or a PING.
    pub server_to_client_ms: u64,
    /// Threshold used to judge the client alive.
    pub client_to_server_ms: u64,
}

/// Combine the client's declared pair with the server's configured pair.
pub fn negotiate(client: Heartbeat, server: Heartbeat) -> Negotiated {
    let server_to_client_ms = if server.x == 0 || client.y == 0 {
        0
    } else {
        server.x.max(client.y)
    };
    let client_to_server_ms = if client.x == 0 || server.y == 0 {
        0
    } else {
        client.x.max(server.y)
    };
    Negotiated {
        server_to_client_ms,
        client_to_server_ms,
    }
}
