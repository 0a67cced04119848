//! Default handler used when no broker is plugged in: accepts every client
//! and traces each frame it receives.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use stomplite_core::error::{Result, StompError};
use stomplite_core::protocol::frame::{LOGIN, SESSION};
use stomplite_core::{Frame, Headers};

use crate::dispatch::{AuthRequest, StompServerHandler, StompServerHandlerFactory};
use crate::engine::ConnectionHandle;

pub struct LoggingHandler {
    conn: ConnectionHandle,
}

impl LoggingHandler {
    pub fn new(conn: ConnectionHandle) -> Self {
        Self { conn }
    }

    /// Trace the frame and honour its `receipt` request.
    fn record(&self, frame: &Frame) -> Result<()> {
        tracing::debug!(
            conn_id = self.conn.id(),
            command = frame.command.as_str(),
            headers = frame.headers.len(),
            body_len = frame.body.as_ref().map(|b| b.len()).unwrap_or(0),
            "frame received"
        );
        self.conn.send_receipt_if_needed(frame)
    }
}

/// `<conn id>-<nanos since epoch>`, unique per process run.
fn session_id(conn_id: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{conn_id}-{nanos:x}")
}

#[async_trait]
impl StompServerHandler for LoggingHandler {
    async fn authenticate(&self, request: AuthRequest) -> Result<Headers> {
        let login = match &request {
            AuthRequest::Headers(h) => h.get(LOGIN).map(str::to_string),
            AuthRequest::Credentials(c) => Some(c.login.clone()),
        };
        tracing::debug!(conn_id = self.conn.id(), login = ?login, "accepting client");
        Ok(Headers::new().with(SESSION, session_id(self.conn.id())))
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn subscribe(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn unsubscribe(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn begin(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn abort(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn commit(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn ack(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    async fn nack(&self, frame: Frame) -> Result<()> {
        self.record(&frame)
    }

    fn exception(&self, err: &StompError) {
        tracing::debug!(conn_id = self.conn.id(), error = %err, "client error");
    }

    async fn disconnected(&self) {
        tracing::debug!(conn_id = self.conn.id(), "client disconnected");
    }

    async fn closed(&self) {
        tracing::debug!(conn_id = self.conn.id(), "connection closed");
    }
}

#[derive(Default)]
pub struct LoggingHandlerFactory;

impl StompServerHandlerFactory for LoggingHandlerFactory {
    fn create(&self, conn: ConnectionHandle) -> Arc<dyn StompServerHandler> {
        Arc::new(LoggingHandler::new(conn))
    }
}
