//! Service configuration

use crate::error::{Error, Result};
use crate::presence::DEFAULT_PALETTE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default liveness window for presence (30s)
pub const DEFAULT_LIVENESS_WINDOW_MS: u64 = 30_000;

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Tunables for `ConflictResolutionService`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Users not seen for longer than this are not reported as active
    pub liveness_window_ms: u64,
    /// Upper bound on waiting for a document lock; `None` waits forever
    pub lock_timeout_ms: Option<u64>,
    /// Buffered events per subscriber before the slowest one lags
    pub event_capacity: usize,
    /// Colors assigned to collaborators
    pub palette: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            liveness_window_ms: DEFAULT_LIVENESS_WINDOW_MS,
            lock_timeout_ms: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.palette.is_empty() {
            return Err(Error::Config("palette must contain at least one color".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window_ms = window.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.liveness_window_ms, 30_000);
        assert!(config.lock_timeout().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServiceConfig = serde_json::from_str(r#"{"lock_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_rejects_empty_palette() {
        let config = ServiceConfig {
            palette: Vec::new(),
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(serde_json::from_str::<ServiceConfig>(r#"{"colour": 1}"#).is_err());
    }
}
