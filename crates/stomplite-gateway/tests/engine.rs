#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use stomplite_core::error::{Result, StompError};
use stomplite_core::protocol::frame::{HEARTBEAT, MESSAGE, RECEIPT_ID, SESSION, VERSION};
use stomplite_core::{CodecLimits, Command, Frame, FrameDecoder, Headers, Heartbeat};
use stomplite_gateway::config::{AuthMode, StompOptions};
use stomplite_gateway::obs::StompMetrics;
use stomplite_gateway::transport::memory::{self, MemoryPeer};
use stomplite_gateway::{
    AuthRequest, ConnectionHandle, StompConnection, StompServerHandler, StompServerHandlerFactory,
};

// --------------------
// Recording handler
// --------------------

#[derive(Clone, Copy)]
enum Auth {
    Accept,
    Reject,
    Hang,
    Panic,
    /// Accept, but also return `version` and `heart-beat` headers.
    Override,
}

struct Recorder {
    auth: Auth,
    teardown_panics: bool,
    events: Mutex<Vec<String>>,
    handle: Mutex<Option<ConnectionHandle>>,
}

impl Recorder {
    fn push(&self, e: impl Into<String>) {
        self.events.lock().unwrap().push(e.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, e: &str) -> usize {
        self.events().iter().filter(|x| x.as_str() == e).count()
    }

    fn handle(&self) -> ConnectionHandle {
        self.handle.lock().unwrap().clone().expect("handler created")
    }
}

struct RecordingHandler {
    rec: Arc<Recorder>,
    conn: ConnectionHandle,
}

#[async_trait]
impl StompServerHandler for RecordingHandler {
    async fn authenticate(&self, request: AuthRequest) -> Result<Headers> {
        match request {
            AuthRequest::Headers(_) => self.rec.push("authenticate"),
            AuthRequest::Credentials(c) => self.rec.push(format!("authenticate:{}", c.login)),
        }
        match self.rec.auth {
            Auth::Accept => Ok(Headers::new().with(SESSION, "sess-1")),
            Auth::Reject => Err(StompError::AuthFailed("bad credentials".into())),
            Auth::Hang => std::future::pending().await,
            Auth::Panic => panic!("authenticator exploded"),
            Auth::Override => Ok(Headers::new()
                .with(VERSION, "1.0")
                .with(SESSION, "sess-1")
                .with(HEARTBEAT, "0,0")),
        }
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        self.rec
            .push(format!("SEND:{}", frame.header("destination").unwrap_or("")));
        match frame.header("fail") {
            Some("err") => Err(StompError::Internal("send rejected".into())),
            Some("panic") => panic!("send exploded"),
            _ => self.conn.send_receipt_if_needed(&frame),
        }
    }

    async fn subscribe(&self, frame: Frame) -> Result<()> {
        let dest = frame.header("destination").unwrap_or("").to_string();
        self.rec.push(format!("SUBSCRIBE:{dest}"));
        let msg = Frame::new(
            Command::Message,
            Headers::new()
                .with("destination", dest)
                .with("subscription", frame.header("id").unwrap_or("0"))
                .with("message-id", "m-1"),
            Some(Bytes::from_static(b"hello")),
        );
        let burst = frame
            .header("burst")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(1);
        for _ in 0..burst {
            if self.conn.write(msg.clone()).is_err() {
                self.rec.push("write-full");
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, _frame: Frame) -> Result<()> {
        self.rec.push("UNSUBSCRIBE");
        Ok(())
    }

    async fn begin(&self, _frame: Frame) -> Result<()> {
        self.rec.push("BEGIN");
        Ok(())
    }

    async fn abort(&self, _frame: Frame) -> Result<()> {
        self.rec.push("ABORT");
        Ok(())
    }

    async fn commit(&self, _frame: Frame) -> Result<()> {
        self.rec.push("COMMIT");
        Ok(())
    }

    async fn ack(&self, _frame: Frame) -> Result<()> {
        self.rec.push("ACK");
        Ok(())
    }

    async fn nack(&self, _frame: Frame) -> Result<()> {
        self.rec.push("NACK");
        Ok(())
    }

    fn exception(&self, err: &StompError) {
        self.rec.push(format!("exception:{}", err.kind().as_str()));
    }

    async fn disconnected(&self) {
        self.rec.push("disconnected");
        if self.rec.teardown_panics {
            panic!("disconnected exploded");
        }
    }

    async fn closed(&self) {
        self.rec.push("closed");
        if self.rec.teardown_panics {
            panic!("closed exploded");
        }
    }
}

struct RecordingFactory(Arc<Recorder>);

impl StompServerHandlerFactory for RecordingFactory {
    fn create(&self, conn: ConnectionHandle) -> Arc<dyn StompServerHandler> {
        *self.0.handle.lock().unwrap() = Some(conn.clone());
        Arc::new(RecordingHandler {
            rec: Arc::clone(&self.0),
            conn,
        })
    }
}

// --------------------
// Harness
// --------------------

struct Harness {
    peer: MemoryPeer,
    rec: Arc<Recorder>,
    metrics: Arc<StompMetrics>,
    task: JoinHandle<()>,
}

fn start(opts: StompOptions, auth: Auth) -> Harness {
    start_with(opts, auth, false)
}

fn start_with(opts: StompOptions, auth: Auth, teardown_panics: bool) -> Harness {
    let (transport, peer) = memory::pair();
    let rec = Arc::new(Recorder {
        auth,
        teardown_panics,
        events: Mutex::new(Vec::new()),
        handle: Mutex::new(None),
    });
    let metrics = Arc::new(StompMetrics::default());
    let conn = StompConnection::new(
        1,
        Arc::new(opts),
        transport,
        &RecordingFactory(Arc::clone(&rec)),
        Arc::clone(&metrics),
    );
    Harness {
        peer,
        rec,
        metrics,
        task: tokio::spawn(conn.run()),
    }
}

fn accepting() -> Harness {
    start(StompOptions::default(), Auth::Accept)
}

fn decode(data: &[u8]) -> Frame {
    let mut d = FrameDecoder::new(CodecLimits::default());
    d.push(data);
    d.next_frame().unwrap().expect("complete frame")
}

async fn next_frame(peer: &mut MemoryPeer) -> Option<Frame> {
    let data = timeout(Duration::from_secs(5), peer.recv()).await.ok()??;
    Some(decode(&data))
}

/// Wait for the engine to finish and return everything it wrote.
async fn finish(h: &mut Harness) -> Vec<Frame> {
    timeout(Duration::from_secs(300), &mut h.task)
        .await
        .expect("engine finished")
        .unwrap();
    let mut out = Vec::new();
    while let Some(data) = h.peer.recv().await {
        out.push(decode(&data));
    }
    out
}

async fn connected(h: &mut Harness, headers: &str) -> Frame {
    h.peer
        .send(format!("CONNECT\naccept-version:1.2\nhost:test\n{headers}\n\0"))
        .unwrap();
    let f = next_frame(&mut h.peer).await.expect("CONNECTED");
    assert_eq!(f.command, Command::Connected);
    f
}

fn closes(m: &StompMetrics, reason: &str) -> u64 {
    m.closes.get(&[("reason", reason)])
}

// --------------------
// CONNECT negotiation
// --------------------

#[tokio::test]
async fn connect_without_accept_version_negotiates_1_2() {
    let mut h = accepting();
    h.peer.send(&b"CONNECT\nhost:test\n\n\0"[..]).unwrap();

    let f = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(f.command, Command::Connected);
    assert_eq!(f.header(VERSION), Some("1.2"));
    assert_eq!(f.header(SESSION), Some("sess-1"));
    assert_eq!(f.header(HEARTBEAT), Some("30000,30000"));
    assert!(!h.peer.is_closed());

    h.peer.hang_up();
    finish(&mut h).await;
    assert_eq!(closes(&h.metrics, "peer_closed"), 1);
}

#[tokio::test]
async fn connect_picks_supported_version_from_list() {
    let mut h = accepting();
    h.peer
        .send(&b"CONNECT\naccept-version:1.0,1.2\nhost:test\n\n\0"[..])
        .unwrap();
    let f = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(f.header(VERSION), Some("1.2"));
    h.peer.hang_up();
    finish(&mut h).await;
}

#[tokio::test]
async fn unsupported_version_gets_error_and_close() {
    let mut h = accepting();
    h.peer
        .send(&b"CONNECT\naccept-version:1.0\nhost:test\n\n\0"[..])
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0]
        .header(MESSAGE)
        .unwrap()
        .contains("does not match versions supported"));
    assert!(h.peer.is_closed());
    assert_eq!(h.rec.count("authenticate"), 0);
    assert_eq!(h.rec.events(), vec!["exception:protocol", "closed"]);
}

#[tokio::test]
async fn handler_headers_cannot_override_negotiated_values() {
    let mut h = start(StompOptions::default(), Auth::Override);
    let f = connected(&mut h, "heart-beat:5000,5000\n").await;

    assert_eq!(f.header(VERSION), Some("1.2"));
    assert_eq!(f.header(HEARTBEAT), Some("30000,30000"));
    assert_eq!(f.header(SESSION), Some("sess-1"));
    assert_eq!(f.headers.iter().filter(|(k, _)| *k == VERSION).count(), 1);
    assert_eq!(f.headers.iter().filter(|(k, _)| *k == HEARTBEAT).count(), 1);

    h.peer.hang_up();
    finish(&mut h).await;
}

#[tokio::test]
async fn duplicate_connect_is_a_protocol_violation() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer.send(&b"CONNECT\nhost:test\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert_eq!(
        frames[0].header(MESSAGE),
        Some("CONNECT has already been called")
    );
    assert_eq!(h.rec.count("authenticate"), 1);
    assert_eq!(h.rec.count("closed"), 1);
}

// --------------------
// Admission guard
// --------------------

async fn assert_rejected_silently(mut h: Harness) {
    let frames = finish(&mut h).await;
    assert!(frames.is_empty(), "no frame may reach the client: {frames:?}");
    assert!(h.peer.is_closed());
    assert_eq!(h.rec.events(), vec!["exception:admission", "closed"]);
    assert_eq!(closes(&h.metrics, "client_error"), 1);
}

#[tokio::test]
async fn oversized_first_message_is_dropped() {
    let opts = StompOptions {
        max_connect_frame_length: 64,
        ..StompOptions::default()
    };
    let h = start(opts, Auth::Accept);
    let padding = "x".repeat(100);
    h.peer
        .send(format!("CONNECT\nhost:test\npad:{padding}\n\n\0"))
        .unwrap();
    assert_rejected_silently(h).await;
}

#[tokio::test]
async fn first_frame_must_be_connect() {
    let h = accepting();
    h.peer
        .send(&b"SEND\ndestination:/q\n\nhello\0"[..])
        .unwrap();
    assert_rejected_silently(h).await;
}

#[tokio::test]
async fn short_first_message_is_dropped() {
    let h = accepting();
    h.peer.send(&b"CONN"[..]).unwrap();
    assert_rejected_silently(h).await;
}

#[tokio::test]
async fn heartbeat_before_connect_is_dropped() {
    let h = accepting();
    h.peer.send(&b"\n"[..]).unwrap();
    assert_rejected_silently(h).await;
}

#[tokio::test]
async fn truncated_connect_is_dropped() {
    let h = accepting();
    h.peer.send(&b"CONNECT\nhost:test\n"[..]).unwrap();
    assert_rejected_silently(h).await;
}

#[tokio::test]
async fn undecodable_connect_is_dropped() {
    let h = accepting();
    h.peer.send(&b"CONNECT\nhost\n\n\0"[..]).unwrap();
    assert_rejected_silently(h).await;
}

// --------------------
// Authentication
// --------------------

#[tokio::test]
async fn rejected_credentials_get_error_and_close() {
    let mut h = start(StompOptions::default(), Auth::Reject);
    h.peer
        .send(&b"CONNECT\nlogin:bob\npasscode:nope\n\n\0"[..])
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0].header(MESSAGE).unwrap().contains("bad credentials"));
    assert_eq!(frames[0].body.as_deref(), Some(&b""[..]));
    assert_eq!(
        h.rec.events(),
        vec!["authenticate", "exception:auth", "closed"]
    );
    assert_eq!(h.metrics.auth_duration.count(&[("outcome", "failed")]), 1);
}

#[tokio::test]
async fn debug_mode_puts_detail_in_error_body() {
    let opts = StompOptions {
        debug: true,
        ..StompOptions::default()
    };
    let mut h = start(opts, Auth::Reject);
    h.peer.send(&b"CONNECT\nlogin:bob\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0].body_as_str().unwrap().contains("AuthFailed"));
}

#[tokio::test]
async fn panicking_authenticator_counts_as_auth_failure() {
    let mut h = start(StompOptions::default(), Auth::Panic);
    h.peer.send(&b"CONNECT\nhost:test\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert_eq!(h.rec.count("exception:auth"), 1);
    assert_eq!(h.rec.count("closed"), 1);
}

#[tokio::test]
async fn credentials_mode_passes_login_to_handler() {
    let opts = StompOptions {
        auth_mode: AuthMode::Credentials,
        ..StompOptions::default()
    };
    let mut h = start(opts, Auth::Accept);
    connected(&mut h, "login:alice\npasscode:secret\n").await;
    assert_eq!(h.rec.events(), vec!["authenticate:alice"]);
    h.peer.hang_up();
    finish(&mut h).await;
}

#[tokio::test]
async fn credentials_mode_requires_a_passcode() {
    let opts = StompOptions {
        auth_mode: AuthMode::Credentials,
        ..StompOptions::default()
    };
    let mut h = start(opts, Auth::Accept);
    h.peer.send(&b"CONNECT\nlogin:alice\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert_eq!(h.rec.count("authenticate:alice"), 0);
    assert_eq!(h.rec.count("closed"), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_authenticator_times_out() {
    let opts = StompOptions {
        auth_timeout: Some(Duration::from_secs(2)),
        ..StompOptions::default()
    };
    let mut h = start(opts, Auth::Hang);
    let started = Instant::now();
    h.peer.send(&b"CONNECT\nhost:test\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0].header(MESSAGE).unwrap().contains("timed out"));
}

#[tokio::test]
async fn failed_connected_write_closes_without_session() {
    let mut h = accepting();
    h.peer.fail_writes();
    h.peer.send(&b"CONNECT\nhost:test\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert!(frames.is_empty());
    assert_eq!(h.rec.events(), vec!["authenticate", "closed"]);
    assert_eq!(closes(&h.metrics, "transport_error"), 1);
}

// --------------------
// Dispatch
// --------------------

#[tokio::test]
async fn frames_are_dispatched_in_arrival_order() {
    let mut h = accepting();
    h.peer
        .send(
            &b"CONNECT\nhost:test\n\n\0\
SEND\ndestination:/a\n\none\0\
SUBSCRIBE\nid:7\ndestination:/q\n\n\0\
BEGIN\ntransaction:t\n\n\0\
ACK\nid:1\n\n\0\
NACK\nid:2\n\n\0\
COMMIT\ntransaction:t\n\n\0\
ABORT\ntransaction:t\n\n\0\
UNSUBSCRIBE\nid:7\n\n\0\
SEND\ndestination:/b\n\ntwo\0"[..],
        )
        .unwrap();

    let f = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(f.command, Command::Connected);

    let msg = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(msg.command, Command::Message);
    assert_eq!(msg.header("destination"), Some("/q"));
    assert_eq!(msg.header("subscription"), Some("7"));
    assert_eq!(msg.body.as_deref(), Some(&b"hello"[..]));

    assert_eq!(
        h.rec.events(),
        vec![
            "authenticate",
            "SEND:/a",
            "SUBSCRIBE:/q",
            "BEGIN",
            "ACK",
            "NACK",
            "COMMIT",
            "ABORT",
            "UNSUBSCRIBE",
            "SEND:/b"
        ]
    );
    assert_eq!(h.metrics.frames_in.get(&[("command", "SEND")]), 2);

    h.peer.hang_up();
    finish(&mut h).await;
}

#[tokio::test]
async fn frame_split_across_messages_is_reassembled() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer.send(&b"SEND\ndestin"[..]).unwrap();
    h.peer.send(&b"ation:/a\nreceipt:r-9\n\nbo"[..]).unwrap();
    h.peer.send(&b"dy\0"[..]).unwrap();

    let receipt = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.header(RECEIPT_ID), Some("r-9"));
    assert_eq!(h.rec.count("SEND:/a"), 1);

    h.peer.hang_up();
    finish(&mut h).await;
}

#[tokio::test]
async fn handler_faults_do_not_close_the_connection() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer
        .send(&b"SEND\ndestination:/a\nfail:err\n\n\0"[..])
        .unwrap();
    h.peer
        .send(&b"SEND\ndestination:/b\nfail:panic\n\n\0"[..])
        .unwrap();
    h.peer
        .send(&b"SEND\ndestination:/c\nreceipt:ok\n\n\0"[..])
        .unwrap();

    let receipt = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(receipt.header(RECEIPT_ID), Some("ok"));
    assert!(!h.peer.is_closed());
    assert_eq!(h.metrics.errors.get(&[("kind", "handler")]), 2);

    h.peer.hang_up();
    finish(&mut h).await;
    assert_eq!(
        h.rec.events(),
        vec!["authenticate", "SEND:/a", "SEND:/b", "SEND:/c", "closed"]
    );
}

#[tokio::test]
async fn server_only_commands_from_client_are_rejected() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer
        .send(&b"MESSAGE\ndestination:/a\n\n\0"[..])
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert_eq!(
        frames[0].header(MESSAGE),
        Some("unexpected MESSAGE frame from client")
    );
}

#[tokio::test]
async fn unknown_command_gets_error_and_close() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer.send(&b"FROB\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Error);
    assert_eq!(h.rec.count("exception:protocol"), 1);
}

#[tokio::test]
async fn malformed_frame_closes_without_error_frame() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer.send(&b"SEND\nno-colon-here\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert!(frames.is_empty());
    assert_eq!(
        h.rec.events(),
        vec!["authenticate", "exception:protocol", "closed"]
    );
}

// --------------------
// DISCONNECT + close
// --------------------

#[tokio::test]
async fn disconnect_with_receipt() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer
        .send(&b"DISCONNECT\nreceipt:bye-1\n\n\0"[..])
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Receipt);
    assert_eq!(frames[0].header(RECEIPT_ID), Some("bye-1"));
    assert_eq!(
        h.rec.events(),
        vec!["authenticate", "disconnected", "closed"]
    );
    assert_eq!(closes(&h.metrics, "disconnect"), 1);
    assert_eq!(h.metrics.connections_active.get(&[]), 0);
}

#[tokio::test]
async fn panicking_teardown_callbacks_do_not_skip_close_steps() {
    let mut h = start_with(StompOptions::default(), Auth::Accept, true);
    connected(&mut h, "").await;
    assert_eq!(h.metrics.connections_active.get(&[]), 1);
    h.peer
        .send(&b"DISCONNECT\nreceipt:bye-2\n\n\0"[..])
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Receipt);
    assert_eq!(frames[0].header(RECEIPT_ID), Some("bye-2"));
    assert!(h.peer.is_closed());
    assert_eq!(
        h.rec.events(),
        vec!["authenticate", "disconnected", "closed"]
    );
    assert_eq!(h.metrics.connections_active.get(&[]), 0);
    assert_eq!(closes(&h.metrics, "disconnect"), 1);
}

#[tokio::test]
async fn panicking_closed_still_closes_transport_on_peer_hang_up() {
    let mut h = start_with(StompOptions::default(), Auth::Accept, true);
    connected(&mut h, "").await;
    h.peer.hang_up();

    let frames = finish(&mut h).await;
    assert!(frames.is_empty());
    assert!(h.peer.is_closed());
    assert_eq!(h.rec.count("closed"), 1);
    assert_eq!(h.metrics.connections_active.get(&[]), 0);
    assert_eq!(closes(&h.metrics, "peer_closed"), 1);
}

#[tokio::test]
async fn disconnect_without_receipt() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.peer.send(&b"DISCONNECT\n\n\0"[..]).unwrap();

    let frames = finish(&mut h).await;
    assert!(frames.is_empty());
    assert_eq!(h.rec.count("disconnected"), 1);
    assert_eq!(h.rec.count("closed"), 1);
}

#[tokio::test]
async fn close_runs_once_whatever_the_trigger() {
    let mut h = accepting();
    connected(&mut h, "").await;
    let handle = h.rec.handle();
    handle.close().unwrap();
    let _ = handle.close();
    h.peer.hang_up();

    finish(&mut h).await;
    assert_eq!(h.rec.count("closed"), 1);
    assert!(handle.is_closed());
    assert!(handle.close().is_err());
    assert_eq!(closes(&h.metrics, "requested"), 1);
}

#[tokio::test]
async fn handle_can_send_error_and_disconnect() {
    let mut h = accepting();
    connected(&mut h, "").await;
    h.rec
        .handle()
        .send_error_and_disconnect(StompError::ProtocolViolation("go away".into()))
        .unwrap();

    let frames = finish(&mut h).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header(MESSAGE), Some("go away"));
    assert!(h.peer.is_closed());
}

// --------------------
// Backpressure
// --------------------

#[tokio::test]
async fn writes_beyond_the_queue_within_one_callback_are_refused() {
    let opts = StompOptions {
        outbound_queue: 2,
        ..StompOptions::default()
    };
    let mut h = start(opts, Auth::Accept);
    connected(&mut h, "").await;
    h.peer
        .send(&b"SUBSCRIBE\nid:1\ndestination:/q\nburst:4\n\n\0"[..])
        .unwrap();

    for _ in 0..2 {
        let msg = next_frame(&mut h.peer).await.unwrap();
        assert_eq!(msg.command, Command::Message);
    }
    assert_eq!(h.rec.count("write-full"), 2);

    // the queue drains between frames, so the next callback can write again
    h.peer
        .send(&b"SUBSCRIBE\nid:2\ndestination:/r\n\n\0"[..])
        .unwrap();
    let msg = next_frame(&mut h.peer).await.unwrap();
    assert_eq!(msg.header("destination"), Some("/r"));
    assert_eq!(h.rec.count("write-full"), 2);

    h.peer.hang_up();
    let rest = finish(&mut h).await;
    assert!(rest.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pause_fetch_resume_gate_inbound_frames() {
    let mut h = accepting();
    connected(&mut h, "").await;
    let handle = h.rec.handle();

    handle.pause().unwrap();
    h.peer.send(&b"SEND\ndestination:/a\n\n\0"[..]).unwrap();
    h.peer.send(&b"SEND\ndestination:/b\n\n\0"[..]).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.rec.events(), vec!["authenticate"]);

    handle.fetch(1).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.rec.events(), vec!["authenticate", "SEND:/a"]);

    handle.resume().unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.rec.events(), vec!["authenticate", "SEND:/a", "SEND:/b"]);

    h.peer.hang_up();
    finish(&mut h).await;
}

// --------------------
// Heartbeats
// --------------------

#[tokio::test(start_paused = true)]
async fn silent_client_is_pinged_then_dropped() {
    let mut h = accepting();
    let started = Instant::now();
    let f = connected(&mut h, "heart-beat:5000,5000\n").await;
    assert_eq!(
        Heartbeat::parse(f.header(HEARTBEAT)),
        Heartbeat::new(30_000, 30_000)
    );

    let frames = finish(&mut h).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(90), "closed after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(91), "closed after {elapsed:?}");

    assert!(frames.len() >= 2);
    assert!(frames.iter().all(Frame::is_ping));
    assert_eq!(h.metrics.heartbeat_timeouts.get(&[]), 1);
    assert_eq!(closes(&h.metrics, "heartbeat_timeout"), 1);
    assert_eq!(h.rec.events(), vec!["authenticate", "closed"]);
}

#[tokio::test(start_paused = true)]
async fn client_traffic_keeps_connection_alive() {
    let mut h = accepting();
    connected(&mut h, "heart-beat:5000,5000\n").await;

    for _ in 0..6 {
        sleep(Duration::from_secs(20)).await;
        h.peer.send(&b"\n"[..]).unwrap();
    }
    assert!(!h.task.is_finished());
    assert_eq!(h.metrics.heartbeat_timeouts.get(&[]), 0);

    h.peer.hang_up();
    finish(&mut h).await;
    assert_eq!(closes(&h.metrics, "peer_closed"), 1);
}

#[tokio::test(start_paused = true)]
async fn no_heartbeats_when_client_declares_none() {
    let mut h = accepting();
    connected(&mut h, "").await;

    sleep(Duration::from_secs(300)).await;
    assert!(h.peer.try_recv().is_none());
    assert!(!h.task.is_finished());

    h.peer.hang_up();
    let frames = finish(&mut h).await;
    assert!(frames.is_empty());
    assert_eq!(h.metrics.heartbeat_pings.get(&[]), 0);
}
