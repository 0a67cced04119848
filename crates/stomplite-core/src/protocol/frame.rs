//! STOMP frame model (command + ordered headers + optional body).
//!
//! Encoding rules:
//! - Header values are escaped (`\\`, `\n`, `\r`, `\c`) except in CONNECT and
//!   CONNECTED frames, which STOMP 1.2 keeps unescaped for 1.0 compatibility.
//! - A frame with a body always carries a `content-length` matching the body;
//!   any caller-supplied value is replaced.
//! - PING is not a STOMP frame: it is written as a single zero byte.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StompError};
use crate::protocol::heartbeat::Heartbeat;

pub const ACCEPT_VERSION: &str = "accept-version";
pub const HEARTBEAT: &str = "heart-beat";
pub const VERSION: &str = "version";
pub const SESSION: &str = "session";
pub const SERVER: &str = "server";
pub const HOST: &str = "host";
pub const LOGIN: &str = "login";
pub const PASSCODE: &str = "passcode";
pub const RECEIPT: &str = "receipt";
pub const RECEIPT_ID: &str = "receipt-id";
pub const MESSAGE: &str = "message";
pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_LENGTH: &str = "content-length";

/// Protocol versions this server speaks, in preference order.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.2"];

/// Wire form of the keep-alive sentinel.
pub const PING_BYTES: &[u8] = &[0];

/// Frame command. `Ping` is the non-protocol keep-alive sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Begin,
    Commit,
    Abort,
    Ack,
    Nack,
    Disconnect,
    Message,
    Error,
    Receipt,
    Ping,
}

impl Command {
    /// Parse a command line. `Ping` has no textual form and never parses.
    pub fn parse(s: &str) -> Option<Self> {
        let cmd = match s {
            "CONNECT" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "ERROR" => Command::Error,
            "RECEIPT" => Command::Receipt,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Receipt => "RECEIPT",
            Command::Ping => "PING",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list. Keys may repeat; lookup returns the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// First value for `name`, per STOMP repeated-header semantics.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    /// Append, keeping any earlier entries with the same key.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Builder form of [`Headers::add`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// Replace every entry for `name` with a single one at the first position.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == name) {
            Some(idx) => {
                self.0[idx].1 = value;
                let mut seen = false;
                self.0.retain(|(k, _)| {
                    if k != name {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => {
                self.0.push((name.to_string(), value));
            }
        }
        self
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| k != name);
    }

    pub fn extend(&mut self, other: Headers) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(v: Vec<(String, String)>) -> Self {
        Self(v)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Frame {
    pub fn new(command: Command, headers: Headers, body: Option<Bytes>) -> Self {
        Self {
            command,
            headers,
            body,
        }
    }

    /// Keep-alive sentinel.
    pub fn ping() -> Self {
        Self::new(Command::Ping, Headers::new(), None)
    }

    pub fn is_ping(&self) -> bool {
        self.command == Command::Ping
    }

    /// CONNECTED reply: `extra` (e.g. the session token) plus the negotiated
    /// `version` and the server's `heart-beat` pair. Those two always win over
    /// same-named entries in `extra`.
    pub fn connected(version: &str, heartbeat: Heartbeat, extra: Headers) -> Self {
        let mut headers = extra;
        headers.set(VERSION, version);
        headers.set(HEARTBEAT, heartbeat.to_string());
        Self::new(Command::Connected, headers, None)
    }

    pub fn receipt(receipt_id: &str) -> Self {
        Self::new(
            Command::Receipt,
            Headers::new().with(RECEIPT_ID, receipt_id),
            None,
        )
    }

    /// ERROR frame with a human-readable `message` header and a text body.
    pub fn error(message: &str, body: &str) -> Self {
        let headers = Headers::new()
            .with(MESSAGE, message)
            .with(CONTENT_LENGTH, body.len().to_string())
            .with(CONTENT_TYPE, "text/plain");
        Self::new(
            Command::Error,
            headers,
            Some(Bytes::copy_from_slice(body.as_bytes())),
        )
    }

    /// ERROR frame for a failure. The detailed body is only produced when
    /// `debug` is set; by default the client sees the message alone.
    pub fn error_from(err: &StompError, debug: bool) -> Self {
        let message = err.to_string();
        if debug {
            Self::error(&message, &error_detail(err))
        } else {
            Self::error(&message, "")
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Value of the `receipt` header, if the client asked for one.
    pub fn receipt_request(&self) -> Option<&str> {
        self.header(RECEIPT)
    }

    pub fn body_as_str(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Serialize to wire bytes. `trailing_line` appends an EOL after the NUL
    /// (off by default; not part of STOMP 1.2 but some peers expect it).
    pub fn encode(&self, trailing_line: bool) -> Bytes {
        if self.is_ping() {
            return Bytes::from_static(PING_BYTES);
        }

        let escape = self.command.escapes_headers();
        let body_len = self.body.as_ref().map(|b| b.len()).unwrap_or(0);
        let mut out = BytesMut::with_capacity(64 + body_len);

        out.put_slice(self.command.as_str().as_bytes());
        out.put_u8(b'\n');

        for (k, v) in self.headers.iter() {
            if k == CONTENT_LENGTH {
                continue;
            }
            put_header_part(&mut out, k, escape);
            out.put_u8(b':');
            put_header_part(&mut out, v, escape);
            out.put_u8(b'\n');
        }
        if let Some(body) = &self.body {
            out.put_slice(CONTENT_LENGTH.as_bytes());
            out.put_u8(b':');
            out.put_slice(body.len().to_string().as_bytes());
            out.put_u8(b'\n');
        }
        out.put_u8(b'\n');

        if let Some(body) = &self.body {
            out.put_slice(body);
        }
        out.put_u8(0);
        if trailing_line {
            out.put_u8(b'\n');
        }
        out.freeze()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (k, v) in self.headers.iter() {
            writeln!(f, "{k}:{v}")?;
        }
        match &self.body {
            Some(b) => write!(f, "\nBody ({} bytes)", b.len()),
            None => Ok(()),
        }
    }
}

fn put_header_part(out: &mut BytesMut, s: &str, escape: bool) {
    if !escape {
        out.put_slice(s.as_bytes());
        return;
    }
    for b in s.bytes() {
        match b {
            b'\\' => out.put_slice(b"\\\\"),
            b'\n' => out.put_slice(b"\\n"),
            b'\r' => out.put_slice(b"\\r"),
            b':' => out.put_slice(b"\\c"),
            other => out.put_u8(other),
        }
    }
}

/// Full failure description: display form, debug form, and the source chain.
fn error_detail(err: &StompError) -> String {
    let mut out = format!("{err}\n\n{err:?}");
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

/// `login`/`passcode` pair for the credential-only authentication variant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub passcode: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("passcode", &"***")
            .finish()
    }
}

impl Credentials {
    /// Extract credentials from CONNECT headers. Missing or blank values are a
    /// protocol violation.
    pub fn from_headers(headers: &Headers) -> Result<Self> {
        let login = non_blank(headers, LOGIN)?;
        let passcode = non_blank(headers, PASSCODE)?;
        Ok(Self { login, passcode })
    }
}

fn non_blank(headers: &Headers, name: &str) -> Result<String> {
    match headers.get(name) {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(StompError::ProtocolViolation(format!(
            "CONNECT frame is missing a non-blank {name} header"
        ))),
    }
}
