//! Top-level facade crate for stomplite.
//!
//! Re-exports the protocol core and the gateway runtime so users can depend on a single crate.

pub mod core {
    pub use stomplite_core::*;
}

pub mod gateway {
    pub use stomplite_gateway::*;
}
