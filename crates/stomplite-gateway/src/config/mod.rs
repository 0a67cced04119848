//! Gateway config loader (strict parsing).

pub mod options;
pub mod schema;

use std::fs;

use stomplite_core::error::{Result, StompError};

pub use options::StompOptions;
pub use schema::{AuthMode, GatewayConfig, ServerSection, StompSection};

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| StompError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| StompError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
