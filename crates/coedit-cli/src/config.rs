//! Configuration file loading
//!
//! ```toml
//! [service]
//! liveness_window_ms = 30000
//! lock_timeout_ms = 250
//!
//! [log]
//! level = "debug"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use coedit_core::ServiceConfig;

/// Contents of a `coedit` configuration file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub service: ServiceConfig,
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(raw)?;
        config.service.validate()?;
        Ok(config)
    }
}
