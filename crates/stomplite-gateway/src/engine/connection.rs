//! Connection engine: admission guard, CONNECT handshake, dispatch,
//! heartbeat monitors and the unified close path.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::Instrument;

use stomplite_core::error::{Result, StompError};
use stomplite_core::protocol::codec::starts_with_connect;
use stomplite_core::protocol::frame::{ACCEPT_VERSION, HEARTBEAT, SESSION, SUPPORTED_VERSIONS};
use stomplite_core::protocol::heartbeat;
use stomplite_core::{Command, Credentials, Frame, FrameDecoder, Headers, Heartbeat};

use crate::config::{AuthMode, StompOptions};
use crate::dispatch::dispatcher::{guarded, guarded_sync};
use crate::dispatch::{dispatch, AuthRequest, StompServerHandler, StompServerHandlerFactory};
use crate::obs::metrics::StompMetrics;
use crate::transport::Transport;

use super::handle::{Control, ConnectionHandle};
use super::session::{next_tick, ConnectionSession};

/// Why a connection was closed (log field and metric label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent DISCONNECT.
    Disconnect,
    /// Remote side closed the transport.
    PeerClosed,
    /// Failure attributed to the client (admission, protocol, auth).
    ClientError,
    /// Client heartbeats stopped.
    HeartbeatTimeout,
    /// Socket read/write failed.
    TransportError,
    /// Closed through a [`ConnectionHandle`].
    Requested,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Disconnect => "disconnect",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ClientError => "client_error",
            CloseReason::HeartbeatTimeout => "heartbeat_timeout",
            CloseReason::TransportError => "transport_error",
            CloseReason::Requested => "requested",
        }
    }
}

pub struct StompConnection<T: Transport> {
    id: u64,
    opts: Arc<StompOptions>,
    transport: T,
    handler: Arc<dyn StompServerHandler>,
    handle: ConnectionHandle,
    control_rx: mpsc::Receiver<Control>,
    decoder: FrameDecoder,
    session: ConnectionSession,
    metrics: Arc<StompMetrics>,
}

impl<T: Transport> StompConnection<T> {
    /// Wrap a freshly accepted transport. The handler is created here, once.
    pub fn new(
        id: u64,
        opts: Arc<StompOptions>,
        transport: T,
        factory: &dyn StompServerHandlerFactory,
        metrics: Arc<StompMetrics>,
    ) -> Self {
        let (tx, control_rx) = mpsc::channel(opts.outbound_queue.max(1));
        let handle = ConnectionHandle::new(id, transport.remote_addr(), tx);
        let handler = factory.create(handle.clone());
        let decoder = FrameDecoder::new(opts.limits);

        metrics.connections_opened.inc(&[]);
        metrics.connections_active.inc(&[]);

        Self {
            id,
            opts,
            transport,
            handler,
            handle,
            control_rx,
            decoder,
            session: ConnectionSession::new(),
            metrics,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Drive the connection until it is closed.
    pub async fn run(mut self) {
        let span = tracing::info_span!(
            "stomp_conn",
            conn_id = self.id,
            remote = ?self.transport.remote_addr()
        );
        async move {
            tracing::debug!("new stomp connection");
            while !self.session.is_closed() {
                self.step().await;
            }
        }
        .instrument(span)
        .await
    }

    /// Wait for and process exactly one event.
    async fn step(&mut self) {
        tokio::select! {
            biased;

            Some(ctl) = self.control_rx.recv() => self.on_control(ctl).await,

            incoming = self.transport.recv() => match incoming {
                Some(Ok(data)) => self.on_message(data).await,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "transport error, closing connection");
                    self.record_error(&e);
                    self.close(CloseReason::TransportError).await;
                }
                None => self.close(CloseReason::PeerClosed).await,
            },

            _ = next_tick(&mut self.session.server_heartbeat) => self.on_server_heartbeat().await,

            _ = next_tick(&mut self.session.client_heartbeat) => self.on_client_heartbeat().await,
        }
    }

    // --------------------
    // Inbound
    // --------------------

    /// One transport message: guarded before CONNECT, then decoded and
    /// dispatched frame by frame in arrival order.
    pub async fn on_message(&mut self, data: Bytes) {
        if self.session.is_closed() {
            tracing::warn!("message received after close, ignoring");
            return;
        }

        let awaiting_connect = !self.session.is_connected();
        if awaiting_connect {
            if let Err(e) = self.admit(&data) {
                self.client_caused(e).await;
                return;
            }
        }

        self.decoder.push(&data);
        let mut decoded_any = false;
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => {
                    decoded_any = true;
                    self.handle_frame(frame).await;
                    if self.session.is_closed() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) if awaiting_connect && !self.session.is_connected() => {
                    self.client_caused(StompError::InvalidConnect(format!(
                        "error parsing connect frame: {e}"
                    )))
                    .await;
                    return;
                }
                Err(e) => {
                    self.client_caused(e).await;
                    return;
                }
            }
        }

        if awaiting_connect && !decoded_any {
            self.client_caused(StompError::InvalidConnect(
                "client sent an incomplete connect frame".into(),
            ))
            .await;
        }
    }

    /// Cheap checks on the first message before the decoder sees it.
    fn admit(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.opts.max_connect_frame_length {
            return Err(StompError::InvalidConnect(
                "client sent a frame larger than the maximum allowed connect frame".into(),
            ));
        }
        if data.len() <= Command::Connect.as_str().len() {
            return Err(StompError::InvalidConnect(
                "client sent an incomplete connect frame".into(),
            ));
        }
        if !starts_with_connect(data) {
            return Err(StompError::InvalidConnect(
                "initial frame does not contain a connect command".into(),
            ));
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) {
        self.metrics
            .frames_in
            .inc(&[("command", frame.command.as_str())]);

        match frame.command {
            Command::Connect => {
                if self.session.is_connected() {
                    self.client_caused(StompError::ProtocolViolation(
                        "CONNECT has already been called".into(),
                    ))
                    .await;
                    return;
                }
                self.on_connect(frame).await;
            }
            Command::Send
            | Command::Subscribe
            | Command::Unsubscribe
            | Command::Begin
            | Command::Abort
            | Command::Commit
            | Command::Ack
            | Command::Nack => {
                if !self.ensure_connected().await {
                    return;
                }
                self.session.touch_client();
                let command = frame.command;
                if let Err(e) = dispatch(self.handler.as_ref(), frame).await {
                    tracing::error!(
                        command = command.as_str(),
                        error = %e,
                        "StompServerHandler callback failed; handlers must not fail"
                    );
                    self.metrics.errors.inc(&[("kind", "handler")]);
                }
            }
            Command::Disconnect => {
                if !self.ensure_connected().await {
                    return;
                }
                self.session.touch_client();
                if let Some(receipt) = frame.receipt_request() {
                    let receipt = Frame::receipt(receipt);
                    if let Err(e) = self.write(&receipt).await {
                        tracing::debug!(error = %e, "failed to write RECEIPT for DISCONNECT");
                    }
                }
                let handler = Arc::clone(&self.handler);
                if let Err(e) = guarded("disconnected", async move {
                    handler.disconnected().await;
                    Ok(())
                })
                .await
                {
                    tracing::error!(error = %e, "StompServerHandler.disconnected failed");
                }
                self.close(CloseReason::Disconnect).await;
            }
            Command::Ping => {
                if !self.ensure_connected().await {
                    return;
                }
                // keep-alive only, no response
                self.session.touch_client();
            }
            other => {
                self.client_caused(StompError::ProtocolViolation(format!(
                    "unexpected {other} frame from client"
                )))
                .await;
            }
        }
    }

    /// Protocol violation (ERROR + close) unless connected.
    async fn ensure_connected(&mut self) -> bool {
        if self.session.is_connected() {
            return true;
        }
        self.client_caused(StompError::ProtocolViolation(
            "client must provide a CONNECT frame before any other frames".into(),
        ))
        .await;
        false
    }

    // --------------------
    // CONNECT
    // --------------------

    async fn on_connect(&mut self, frame: Frame) {
        let Some(version) = negotiate_version(frame.header(ACCEPT_VERSION)) else {
            self.client_caused(StompError::UnsupportedVersion).await;
            return;
        };

        let request = match self.opts.auth_mode {
            AuthMode::Headers => AuthRequest::Headers(frame.headers.clone()),
            AuthMode::Credentials => match Credentials::from_headers(&frame.headers) {
                Ok(c) => AuthRequest::Credentials(c),
                Err(e) => {
                    self.client_caused(e).await;
                    return;
                }
            },
        };

        let started = StdInstant::now();
        let outcome =
            authenticate(Arc::clone(&self.handler), self.opts.auth_timeout, request).await;
        self.metrics.auth_duration.observe(
            &[("outcome", if outcome.is_ok() { "ok" } else { "failed" })],
            started.elapsed(),
        );

        let extra = match outcome {
            Ok(extra) => extra,
            Err(e) => {
                let e = match e {
                    StompError::AuthFailed(_) => e,
                    other => StompError::AuthFailed(other.to_string()),
                };
                self.client_caused(e).await;
                return;
            }
        };

        let auth_token = extra.get(SESSION).map(str::to_string);
        let connected = Frame::connected(&version, self.opts.heartbeat, extra);
        if let Err(e) = self.write(&connected).await {
            tracing::debug!(error = %e, "could not send CONNECTED frame");
            self.close(CloseReason::TransportError).await;
            return;
        }

        let client_hb = Heartbeat::parse(frame.header(HEARTBEAT));
        let periods = heartbeat::negotiate(client_hb, self.opts.heartbeat);
        self.session.on_connected(version, auth_token, periods);

        tracing::debug!(
            version = self.session.version(),
            server_to_client_ms = periods.server_to_client_ms,
            client_to_server_ms = periods.client_to_server_ms,
            "stomp client authenticated"
        );
    }

    // --------------------
    // Outbound
    // --------------------

    async fn write(&mut self, frame: &Frame) -> Result<()> {
        self.session.touch_server();
        let data = frame.encode(self.opts.trailing_line);
        self.transport.send(data).await
    }

    async fn send_error(&mut self, err: &StompError) {
        let frame = Frame::error_from(err, self.opts.debug);
        if let Err(e) = self.write(&frame).await {
            tracing::debug!(error = %e, "problem sending ERROR frame to client");
        }
    }

    async fn send_error_and_close(&mut self, err: &StompError) {
        tracing::debug!(error = %err, "sending ERROR and disconnecting client");
        self.send_error(err).await;
        self.close(CloseReason::ClientError).await;
    }

    async fn on_control(&mut self, ctl: Control) {
        if self.session.is_closed() {
            return;
        }
        match ctl {
            Control::Write(frame) => {
                if let Err(e) = self.write(&frame).await {
                    tracing::debug!(error = %e, command = frame.command.as_str(), "handler write failed");
                }
            }
            Control::Error(err) => self.send_error(&err).await,
            Control::ErrorAndClose(err) => self.send_error_and_close(&err).await,
            Control::Close => self.close(CloseReason::Requested).await,
            Control::Pause => self.transport.pause(),
            Control::Resume => self.transport.resume(),
            Control::Fetch(n) => self.transport.fetch(n),
        }
    }

    // --------------------
    // Heartbeats
    // --------------------

    async fn on_server_heartbeat(&mut self) {
        let period = self.session.periods().server_to_client_ms;
        if period == 0 || self.session.server_idle().as_millis() < u128::from(period) {
            return;
        }
        // written directly: a PING must not count as server activity
        let ping = Frame::ping().encode(false);
        match self.transport.send(ping).await {
            Ok(()) => self.metrics.heartbeat_pings.inc(&[]),
            Err(e) => tracing::debug!(error = %e, "failed to write PING"),
        }
    }

    async fn on_client_heartbeat(&mut self) {
        let period = self.session.periods().client_to_server_ms;
        if period == 0 {
            return;
        }
        let idle = self.session.client_idle();
        if idle.as_millis() > u128::from(period) * 2 {
            tracing::debug!(
                idle_ms = idle.as_millis() as u64,
                "disconnecting client: no client activity"
            );
            self.metrics.heartbeat_timeouts.inc(&[]);
            self.close(CloseReason::HeartbeatTimeout).await;
        }
    }

    // --------------------
    // Failure + close
    // --------------------

    fn record_error(&self, err: &StompError) {
        self.metrics.errors.inc(&[("kind", err.kind().as_str())]);
    }

    /// Client-caused failure: notify the handler, then ERROR + close for
    /// protocol/auth failures, plain close otherwise.
    async fn client_caused(&mut self, err: StompError) {
        self.record_error(&err);
        let handler = Arc::clone(&self.handler);
        if let Err(e) = guarded_sync("exception", || handler.exception(&err)) {
            tracing::error!(error = %e, "StompServerHandler.exception failed");
        }

        if err.sends_error_frame() {
            self.send_error_and_close(&err).await;
        } else {
            tracing::debug!(error = %err, kind = err.kind().as_str(), "closing connection");
            self.close(CloseReason::ClientError).await;
        }
    }

    /// Idempotent teardown. Each step runs even if an earlier one failed.
    pub async fn close(&mut self, reason: CloseReason) {
        if self.session.is_closed() {
            return;
        }
        tracing::debug!(reason = reason.as_str(), "closing stomp connection");

        self.session.mark_closed();
        self.session.cancel_heartbeats();

        let handler = Arc::clone(&self.handler);
        if let Err(e) = guarded("closed", async move {
            handler.closed().await;
            Ok(())
        })
        .await
        {
            tracing::error!(error = %e, "StompServerHandler.closed failed");
        }

        if !self.transport.is_closed() {
            if let Err(e) = self.transport.close().await {
                tracing::warn!(error = %e, "error closing transport");
            }
        }

        self.metrics.closes.inc(&[("reason", reason.as_str())]);
        self.metrics.connections_active.dec(&[]);
    }
}

/// Ask the handler, with the optional timeout; panics count as failures.
async fn authenticate(
    handler: Arc<dyn StompServerHandler>,
    timeout: Option<Duration>,
    request: AuthRequest,
) -> Result<Headers> {
    let call = guarded("authenticate", handler.authenticate(request));
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(res) => res,
            Err(_) => Err(StompError::AuthFailed(format!(
                "authentication timed out after {} ms",
                limit.as_millis()
            ))),
        },
        None => call.await,
    }
}

/// First server-supported version the client accepts. Absent header means `1.2`.
fn negotiate_version(accept: Option<&str>) -> Option<String> {
    let accepted: Vec<&str> = match accept {
        Some(list) => list.split(',').map(str::trim).collect(),
        None => vec!["1.2"],
    };
    SUPPORTED_VERSIONS
        .iter()
        .find(|v| accepted.contains(v))
        .map(|v| v.to_string())
}
