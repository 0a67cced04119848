//! In-process metrics, rendered by the `/metrics` endpoint.

pub mod metrics;

pub use metrics::StompMetrics;
