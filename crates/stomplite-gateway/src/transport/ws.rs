//! WebSocket binding (axum).
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on the configured path, negotiating the STOMP
//!   sub-protocols
//! - Feed text and binary messages to the engine as raw bytes
//! - Write engine output as binary messages
//! - Backpressure: while paused the socket is simply not polled

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use stomplite_core::error::{Result, StompError};

use crate::app_state::AppState;
use crate::engine::StompConnection;
use crate::transport::{Demand, Transport};

/// Sub-protocols offered to clients, most preferred first.
pub const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

pub struct WsTransport {
    sink: SplitSink<WebSocket, Message>,
    stream: SplitStream<WebSocket>,
    demand: Demand,
    closed: bool,
    remote: Option<SocketAddr>,
}

impl WsTransport {
    pub fn new(socket: WebSocket, remote: Option<SocketAddr>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink,
            stream,
            demand: Demand::default(),
            closed: false,
            remote,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Bytes>> {
        if !self.demand.ready() {
            std::future::pending::<()>().await;
        }
        loop {
            let msg = match self.stream.next().await {
                None => {
                    self.closed = true;
                    return None;
                }
                Some(Err(e)) => return Some(Err(StompError::Transport(e.to_string()))),
                Some(Ok(msg)) => msg,
            };
            let data = match msg {
                Message::Binary(b) => Bytes::from(b),
                Message::Text(s) => Bytes::from(s.into_bytes()),
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    self.closed = true;
                    return None;
                }
            };
            self.demand.consume();
            return Some(Ok(data));
        }
    }

    async fn send(&mut self, data: Bytes) -> Result<()> {
        if self.closed {
            return Err(StompError::Transport("websocket already closed".into()));
        }
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| StompError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| StompError::Transport(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn pause(&mut self) {
        self.demand.pause();
    }

    fn resume(&mut self) {
        self.demand.resume();
    }

    fn fetch(&mut self, amount: u64) {
        self.demand.fetch(amount);
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    app.metrics().ws_upgrades.inc(&[]);
    ws.protocols(STOMP_SUBPROTOCOLS)
        .on_upgrade(move |socket| serve_socket(app, socket, Some(remote)))
}

/// Run one STOMP connection over an upgraded socket until it closes.
pub async fn serve_socket(app: AppState, socket: WebSocket, remote: Option<SocketAddr>) {
    let transport = WsTransport::new(socket, remote);
    let conn = StompConnection::new(
        app.next_connection_id(),
        app.options(),
        transport,
        app.handler_factory().as_ref(),
        app.metrics(),
    );
    conn.run().await;
}
