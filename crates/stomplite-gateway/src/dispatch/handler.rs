use std::sync::Arc;

use async_trait::async_trait;

use stomplite_core::error::{Result, StompError};
use stomplite_core::{Credentials, Frame, Headers};

use crate::engine::ConnectionHandle;

/// What the handler is asked to authenticate.
#[derive(Debug, Clone)]
pub enum AuthRequest {
    /// Every header of the CONNECT frame.
    Headers(Headers),
    /// Credential-only variant (`auth_mode: credentials`).
    Credentials(Credentials),
}

/// Per-connection application logic.
///
/// Callbacks are invoked sequentially, in frame arrival order, from the
/// connection's own task. Returning `Err` (or panicking) from a command
/// callback is logged and swallowed; the connection stays open.
#[async_trait]
pub trait StompServerHandler: Send + Sync {
    /// Accept or refuse the client. On success the returned headers (e.g.
    /// `session`) are added to the CONNECTED frame. An `Err` is sent to the
    /// client as an ERROR frame and the connection is closed.
    async fn authenticate(&self, request: AuthRequest) -> Result<Headers>;

    async fn send(&self, frame: Frame) -> Result<()>;
    async fn subscribe(&self, frame: Frame) -> Result<()>;
    async fn unsubscribe(&self, frame: Frame) -> Result<()>;
    async fn begin(&self, frame: Frame) -> Result<()>;
    async fn abort(&self, frame: Frame) -> Result<()>;
    async fn commit(&self, frame: Frame) -> Result<()>;
    async fn ack(&self, frame: Frame) -> Result<()>;
    async fn nack(&self, frame: Frame) -> Result<()>;

    /// A client-caused failure is about to close the connection.
    fn exception(&self, _err: &StompError) {}

    /// The client sent DISCONNECT. Always followed by [`closed`](Self::closed).
    async fn disconnected(&self) {}

    /// Called exactly once when the connection closes, whatever the cause.
    /// Release per-connection resources (subscriptions) here.
    async fn closed(&self) {}
}

/// Builds one handler per accepted connection.
pub trait StompServerHandlerFactory: Send + Sync {
    fn create(&self, conn: ConnectionHandle) -> Arc<dyn StompServerHandler>;
}
