//! Transport bindings.
//!
//! The connection engine only sees the [`Transport`] trait: framed bytes in,
//! framed bytes out, plus the binding's backpressure primitives, which the
//! engine forwards untouched.

pub mod memory;
pub mod ws;

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use stomplite_core::error::Result;

#[async_trait]
pub trait Transport: Send {
    /// Next inbound message. `None` once the peer has gone away.
    ///
    /// Must be cancel-safe; while paused it must not complete.
    async fn recv(&mut self) -> Option<Result<Bytes>>;

    async fn send(&mut self, data: Bytes) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Stop delivering inbound messages.
    fn pause(&mut self);

    /// Deliver inbound messages without limit.
    fn resume(&mut self);

    /// Deliver `amount` more inbound messages, then pause again.
    fn fetch(&mut self, amount: u64);

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Inbound demand shared by the bindings: unbounded, or a remaining budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand(Option<u64>);

impl Demand {
    pub fn pause(&mut self) {
        self.0 = Some(0);
    }

    pub fn resume(&mut self) {
        self.0 = None;
    }

    pub fn fetch(&mut self, amount: u64) {
        if let Some(n) = self.0.as_mut() {
            *n = n.saturating_add(amount);
        }
    }

    pub fn ready(&self) -> bool {
        self.0 != Some(0)
    }

    /// Account for one delivered message.
    pub fn consume(&mut self) {
        if let Some(n) = self.0.as_mut() {
            *n = n.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Demand;

    #[test]
    fn fetch_grants_a_bounded_budget() {
        let mut d = Demand::default();
        assert!(d.ready());

        d.pause();
        assert!(!d.ready());

        d.fetch(2);
        d.consume();
        assert!(d.ready());
        d.consume();
        assert!(!d.ready());

        d.resume();
        d.consume();
        assert!(d.ready());
    }

    #[test]
    fn fetch_while_flowing_stays_unbounded() {
        let mut d = Demand::default();
        d.fetch(1);
        d.consume();
        d.consume();
        assert!(d.ready());
    }
}
