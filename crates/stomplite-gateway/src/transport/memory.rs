//! In-process transport pair, used to embed the engine without a socket and
//! to drive it from tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use stomplite_core::error::{Result, StompError};

use super::{Demand, Transport};

/// Engine side of the pair.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<Bytes>,
    demand: Demand,
    state: Arc<SharedState>,
}

/// Peer side of the pair: plays the remote client.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<SharedState>,
}

#[derive(Default)]
struct SharedState {
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let state = Arc::new(SharedState::default());
    (
        MemoryTransport {
            inbound: in_rx,
            outbound: out_tx,
            demand: Demand::default(),
            state: Arc::clone(&state),
        },
        MemoryPeer {
            tx: Some(in_tx),
            rx: out_rx,
            state,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn recv(&mut self) -> Option<Result<Bytes>> {
        if !self.demand.ready() {
            std::future::pending::<()>().await;
        }
        let data = self.inbound.recv().await?;
        self.demand.consume();
        Some(Ok(data))
    }

    async fn send(&mut self, data: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(StompError::Transport("transport already closed".into()));
        }
        if self.state.fail_writes.load(Ordering::Relaxed) {
            return Err(StompError::Transport("write failed".into()));
        }
        self.outbound
            .send(data)
            .map_err(|_| StompError::Transport("peer dropped".into()))
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Relaxed)
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
}

impl MemoryPeer {
    /// Deliver one inbound message to the engine.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| StompError::Transport("peer already hung up".into()))?;
        tx.send(data.into())
            .map_err(|_| StompError::Transport("engine dropped".into()))
    }

    /// Simulate the remote side closing the socket.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Next message written by the engine; `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Make every subsequent engine write fail.
    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::Relaxed);
    }

    /// Whether the engine closed its side.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Relaxed)
    }
}
