use std::net::SocketAddr;

use tokio::sync::mpsc;

use stomplite_core::error::{Result, StompError};
use stomplite_core::Frame;

/// Requests queued to the connection task.
#[derive(Debug)]
pub(super) enum Control {
    Write(Frame),
    Error(StompError),
    ErrorAndClose(StompError),
    Close,
    Pause,
    Resume,
    Fetch(u64),
}

/// Cheap, cloneable handle to one connection.
///
/// Every call only enqueues work for the connection's own task, so it is safe
/// to use from handler callbacks (it never waits on the engine) and from other
/// tasks. Requests are applied in the order they were made.
///
/// The queue holds `outbound_queue` requests and is only drained between
/// frames: a callback that enqueues more than that before returning gets
/// `StompError::Transport("outbound queue full")` for the excess, and those
/// requests are dropped. Stream large backlogs from a separate task instead.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: u64,
    remote: Option<SocketAddr>,
    tx: mpsc::Sender<Control>,
}

impl ConnectionHandle {
    pub(super) fn new(id: u64, remote: Option<SocketAddr>, tx: mpsc::Sender<Control>) -> Self {
        Self { id, remote, tx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Whether the connection task has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue `frame` for the client. Fails when the queue is full (see the
    /// type docs) or the connection has finished.
    pub fn write(&self, frame: Frame) -> Result<()> {
        self.enqueue(Control::Write(frame))
    }

    /// Queue a RECEIPT if `frame` carries a `receipt` header.
    pub fn send_receipt_if_needed(&self, frame: &Frame) -> Result<()> {
        match frame.receipt_request() {
            Some(id) => self.write(Frame::receipt(id)),
            None => Ok(()),
        }
    }

    pub fn send_error(&self, err: StompError) -> Result<()> {
        self.enqueue(Control::Error(err))
    }

    pub fn send_error_and_disconnect(&self, err: StompError) -> Result<()> {
        self.enqueue(Control::ErrorAndClose(err))
    }

    pub fn close(&self) -> Result<()> {
        self.enqueue(Control::Close)
    }

    pub fn pause(&self) -> Result<()> {
        self.enqueue(Control::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.enqueue(Control::Resume)
    }

    pub fn fetch(&self, amount: u64) -> Result<()> {
        self.enqueue(Control::Fetch(amount))
    }

    fn enqueue(&self, c: Control) -> Result<()> {
        self.tx.try_send(c).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                StompError::Transport("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                StompError::Transport("connection closed".into())
            }
        })
    }
}
