//! Shared application state: validated config, derived engine options, the
//! handler factory and the metrics registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stomplite_core::error::Result;

use crate::config::{GatewayConfig, StompOptions};
use crate::dispatch::StompServerHandlerFactory;
use crate::obs::StompMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    options: Arc<StompOptions>,
    factory: Arc<dyn StompServerHandlerFactory>,
    metrics: Arc<StompMetrics>,
    next_id: AtomicU64,
}

impl AppState {
    /// Validate `cfg` and bind it to the application's handler factory.
    pub fn new(cfg: GatewayConfig, factory: Arc<dyn StompServerHandlerFactory>) -> Result<Self> {
        cfg.validate()?;
        let options = Arc::new(StompOptions::from(&cfg.stomp));
        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                options,
                factory,
                metrics: Arc::new(StompMetrics::default()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn options(&self) -> Arc<StompOptions> {
        Arc::clone(&self.inner.options)
    }

    pub fn handler_factory(&self) -> Arc<dyn StompServerHandlerFactory> {
        Arc::clone(&self.inner.factory)
    }

    pub fn metrics(&self) -> Arc<StompMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Process-unique connection id, starting at 1.
    pub fn next_connection_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
