//! Shared error type across stomplite crates.

use thiserror::Error;

/// Failure classification (stable, low-cardinality).
///
/// Decides how a connection reacts to a failure and is used as a label in
/// logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// First inbound message rejected before the peer is trusted.
    Admission,
    /// Peer broke the STOMP contract.
    Protocol,
    /// Authentication was refused.
    Auth,
    /// Application handler misbehaved.
    Handler,
    /// Socket write/close failure.
    Transport,
    /// Anything else (config, internal bugs).
    Internal,
}

impl ErrorKind {
    /// String representation used in log fields and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Admission => "admission",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Auth => "auth",
            ErrorKind::Handler => "handler",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, StompError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum StompError {
    #[error("malformed frame: {0}")]
    BadFrame(String),
    #[error("frame too large: {0}")]
    FrameTooLarge(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid connect frame: {0}")]
    InvalidConnect(String),
    #[error("{0}")]
    ProtocolViolation(String),
    #[error("client protocol requirement does not match versions supported by the server")]
    UnsupportedVersion,
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("handler fault: {0}")]
    Handler(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl StompError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StompError::InvalidConnect(_) => ErrorKind::Admission,
            StompError::BadFrame(_)
            | StompError::FrameTooLarge(_)
            | StompError::UnknownCommand(_)
            | StompError::ProtocolViolation(_)
            | StompError::UnsupportedVersion => ErrorKind::Protocol,
            StompError::AuthFailed(_) => ErrorKind::Auth,
            StompError::Handler(_) => ErrorKind::Handler,
            StompError::Transport(_) => ErrorKind::Transport,
            StompError::Config(_) | StompError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the peer should receive an ERROR frame before the connection closes.
    ///
    /// Only protocol violations and authentication failures reach the peer.
    /// Codec failures are protocol-class but the peer gets no ERROR frame:
    /// the byte stream can no longer be trusted to carry one.
    pub fn sends_error_frame(&self) -> bool {
        match self {
            StompError::BadFrame(_) | StompError::FrameTooLarge(_) => false,
            other => matches!(other.kind(), ErrorKind::Protocol | ErrorKind::Auth),
        }
    }
}
