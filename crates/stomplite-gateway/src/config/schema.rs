use serde::Deserialize;
use stomplite_core::error::{Result, StompError};
use stomplite_core::protocol::codec::{
    DEFAULT_MAX_BODY_LENGTH, DEFAULT_MAX_HEADERS, DEFAULT_MAX_HEADER_LENGTH,
};
use stomplite_core::Heartbeat;

/// Smallest possible CONNECT frame: `CONNECT\n\n\0`.
pub const MIN_CONNECT_FRAME_LENGTH: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub stomp: StompSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(StompError::Config(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }

        self.server.validate()?;
        self.stomp.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Exact path (not a prefix) on which WebSocket upgrades are accepted.
    #[serde(default = "default_websocket_path")]
    pub websocket_path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            websocket_path: default_websocket_path(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !self.websocket_path.starts_with('/') {
            return Err(StompError::Config(
                "server.websocket_path must start with '/'".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:61613".into()
}
fn default_websocket_path() -> String {
    "/stomp".into()
}

/// How the CONNECT frame is presented to the application handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Full CONNECT header set.
    #[default]
    Headers,
    /// `login`/`passcode` only; missing or blank values are rejected.
    Credentials,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StompSection {
    #[serde(default = "default_max_connect_frame_length")]
    pub max_connect_frame_length: usize,

    #[serde(default = "default_max_header_length")]
    pub max_header_length: usize,

    #[serde(default = "default_max_headers")]
    pub max_headers: usize,

    #[serde(default = "default_max_body_length")]
    pub max_body_length: usize,

    #[serde(default)]
    pub heartbeat: Heartbeat,

    #[serde(default)]
    pub trailing_line: bool,

    /// Leak failure detail into ERROR frame bodies. Never enable in production.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// 0 = wait for the handler indefinitely.
    #[serde(default)]
    pub auth_timeout_ms: u64,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for StompSection {
    fn default() -> Self {
        Self {
            max_connect_frame_length: default_max_connect_frame_length(),
            max_header_length: default_max_header_length(),
            max_headers: default_max_headers(),
            max_body_length: default_max_body_length(),
            heartbeat: Heartbeat::default(),
            trailing_line: false,
            debug: false,
            auth_mode: AuthMode::default(),
            auth_timeout_ms: 0,
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl StompSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_connect_frame_length < MIN_CONNECT_FRAME_LENGTH {
            return Err(StompError::Config(format!(
                "stomp.max_connect_frame_length must be at least {MIN_CONNECT_FRAME_LENGTH}"
            )));
        }
        if self.max_header_length == 0 || self.max_headers == 0 || self.max_body_length == 0 {
            return Err(StompError::Config(
                "stomp.max_header_length, max_headers and max_body_length must be > 0".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(StompError::Config("stomp.outbound_queue must be > 0".into()));
        }
        Ok(())
    }
}

fn default_max_connect_frame_length() -> usize {
    10 * 1024
}
fn default_max_header_length() -> usize {
    DEFAULT_MAX_HEADER_LENGTH
}
fn default_max_headers() -> usize {
    DEFAULT_MAX_HEADERS
}
fn default_max_body_length() -> usize {
    DEFAULT_MAX_BODY_LENGTH
}
fn default_outbound_queue() -> usize {
    1024
}
