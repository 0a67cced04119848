//! Streaming STOMP frame decoder (panic-free).
//!
//! Parsing rules:
//! - Bytes are buffered until a full frame is available; partial frames yield
//!   `Ok(None)`.
//! - A bare EOL (`\n` or `\r\n`) or a lone NUL between frames is a heartbeat
//!   and decodes as [`Frame::ping`].
//! - Size and count limits are checked while buffering, so an oversized frame
//!   fails before it is fully received.
//! - After an error the decoder is poisoned: the byte stream is no longer
//!   trusted.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Result, StompError};
use crate::protocol::frame::{Command, Frame, Headers, CONTENT_LENGTH};

/// Default limits, mirrored by the gateway config defaults.
pub const DEFAULT_MAX_HEADER_LENGTH: usize = 10 * 1024;
pub const DEFAULT_MAX_HEADERS: usize = 1000;
pub const DEFAULT_MAX_BODY_LENGTH: usize = 10 * 1024 * 1024;

/// Size/count limits enforced by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Max length of a single header line (and of the command line).
    pub max_header_length: usize,
    /// Max number of headers per frame.
    pub max_headers: usize,
    /// Max body length in bytes.
    pub max_body_length: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_header_length: DEFAULT_MAX_HEADER_LENGTH,
            max_headers: DEFAULT_MAX_HEADERS,
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
        }
    }
}

/// Cheap check used before the decoder is trusted with a first message.
pub fn starts_with_connect(data: &[u8]) -> bool {
    data.starts_with(Command::Connect.as_str().as_bytes())
}

/// Incremental decoder. Feed with [`FrameDecoder::push`], drain with
/// [`FrameDecoder::next_frame`].
#[derive(Debug)]
pub struct FrameDecoder {
    limits: CodecLimits,
    buf: BytesMut,
    poisoned: bool,
}

/// Header block parsed out of the buffer, body not yet located.
struct Head {
    command: Command,
    headers: Headers,
    body_start: usize,
}

impl FrameDecoder {
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            limits,
            buf: BytesMut::new(),
            poisoned: false,
        }
    }

    pub fn limits(&self) -> CodecLimits {
        self.limits
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete frame, if any.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.poisoned {
            return Err(StompError::BadFrame(
                "decoder used after a previous failure".into(),
            ));
        }
        match self.decode_one() {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::trace!(error = %e, buffered = self.buf.len(), "stomp decode failed");
                self.poisoned = true;
                self.buf.clear();
                Err(e)
            }
        }
    }

    /// Decode every complete frame currently buffered.
    pub fn decode_all(&mut self) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        while let Some(frame) = self.next_frame()? {
            out.push(frame);
        }
        Ok(out)
    }

    fn decode_one(&mut self) -> Result<Option<Frame>> {
        match self.buf.first().copied() {
            None => return Ok(None),
            Some(b'\n') | Some(0) => {
                self.buf.advance(1);
                return Ok(Some(Frame::ping()));
            }
            Some(b'\r') => match self.buf.get(1).copied() {
                None => return Ok(None),
                Some(b'\n') => {
                    self.buf.advance(2);
                    return Ok(Some(Frame::ping()));
                }
                Some(_) => return Err(StompError::BadFrame("stray CR before command".into())),
            },
            Some(_) => {}
        }

        let Some(head) = self.parse_head()? else {
            return Ok(None);
        };

        let declared_len = match head.headers.get(CONTENT_LENGTH) {
            Some(v) => {
                let n = v.trim().parse::<usize>().map_err(|_| {
                    StompError::BadFrame(format!("invalid content-length: {v}"))
                })?;
                if n > self.limits.max_body_length {
                    return Err(StompError::FrameTooLarge(format!(
                        "body length {n} exceeds limit {}",
                        self.limits.max_body_length
                    )));
                }
                Some(n)
            }
            None => None,
        };

        let available = &self.buf[head.body_start..];
        let body_len = match declared_len {
            Some(n) => {
                match available.get(n).copied() {
                    None => return Ok(None),
                    Some(0) => {}
                    Some(_) => {
                        return Err(StompError::BadFrame(
                            "body not terminated by NUL after content-length bytes".into(),
                        ))
                    }
                }
                n
            }
            None => match available.iter().position(|&b| b == 0) {
                Some(n) => {
                    if n > self.limits.max_body_length {
                        return Err(self.body_too_large(n));
                    }
                    n
                }
                None => {
                    if available.len() > self.limits.max_body_length {
                        return Err(self.body_too_large(available.len()));
                    }
                    return Ok(None);
                }
            },
        };

        let mut raw = self.buf.split_to(head.body_start + body_len + 1);
        raw.advance(head.body_start);
        raw.truncate(body_len);
        let body: Option<Bytes> = if body_len == 0 && declared_len.is_none() {
            None
        } else {
            Some(raw.freeze())
        };

        Ok(Some(Frame::new(head.command, head.headers, body)))
    }

    fn body_too_large(&self, n: usize) -> StompError {
        StompError::FrameTooLarge(format!(
            "body length {n} exceeds limit {}",
            self.limits.max_body_length
        ))
    }

    /// Parse command + headers. `Ok(None)` means the header block is incomplete.
    fn parse_head(&self) -> Result<Option<Head>> {
        let buf = &self.buf[..];
        let mut pos = 0usize;

        let Some(line) = self.next_line(buf, &mut pos)? else {
            return Ok(None);
        };
        let cmd_text = std::str::from_utf8(line)
            .map_err(|_| StompError::BadFrame("command is not valid UTF-8".into()))?;
        let command = Command::parse(cmd_text)
            .ok_or_else(|| StompError::UnknownCommand(cmd_text.to_string()))?;
        let unescape = !matches!(command, Command::Connect | Command::Connected);

        let mut headers = Headers::new();
        loop {
            let Some(line) = self.next_line(buf, &mut pos)? else {
                return Ok(None);
            };
            if line.is_empty() {
                break;
            }
            if headers.len() >= self.limits.max_headers {
                return Err(StompError::FrameTooLarge(format!(
                    "more than {} headers",
                    self.limits.max_headers
                )));
            }
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| StompError::BadFrame("header line without ':'".into()))?;
            let (name, value) = line.split_at(colon);
            let value = value.get(1..).unwrap_or_default();
            headers.add(
                header_text(name, unescape)?,
                header_text(value, unescape)?,
            );
        }

        Ok(Some(Head {
            command,
            headers,
            body_start: pos,
        }))
    }

    /// Next EOL-terminated line starting at `pos` (CR of a CRLF stripped).
    fn next_line<'a>(&self, buf: &'a [u8], pos: &mut usize) -> Result<Option<&'a [u8]>> {
        let rest = buf.get(*pos..).unwrap_or_default();
        match rest.iter().position(|&b| b == b'\n') {
            Some(n) => {
                if n > self.limits.max_header_length {
                    return Err(self.line_too_long());
                }
                *pos += n + 1;
                let line = rest.get(..n).unwrap_or_default();
                Ok(Some(line.strip_suffix(b"\r").unwrap_or(line)))
            }
            None => {
                if rest.len() > self.limits.max_header_length {
                    return Err(self.line_too_long());
                }
                Ok(None)
            }
        }
    }

    fn line_too_long(&self) -> StompError {
        StompError::FrameTooLarge(format!(
            "header line exceeds {} bytes",
            self.limits.max_header_length
        ))
    }
}

fn header_text(raw: &[u8], unescape: bool) -> Result<String> {
    let s = std::str::from_utf8(raw)
        .map_err(|_| StompError::BadFrame("header is not valid UTF-8".into()))?;
    if !unescape || !s.contains('\\') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            other => {
                return Err(StompError::BadFrame(format!(
                    "undefined escape sequence \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
