//! Watch session configuration.
//!
//! Provides the limits and defaults applied to every watch session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for watch sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Default debounce interval for notification mode, in milliseconds.
    pub debounce_interval_ms: u64,

    /// Maximum session duration in seconds.
    pub max_session_secs: u64,

    /// Capacity of the outbound event channel shared by a session's pumps.
    pub outbound_buffer: usize,

    /// Whether watch metrics are recorded.
    pub metrics_enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_interval_ms: 1000,
            max_session_secs: 30 * 60,
            outbound_buffer: 100,
            metrics_enabled: true,
        }
    }
}

impl WatchConfig {
    /// Sets the default debounce interval.
    #[must_use]
    pub fn with_debounce_interval(mut self, ms: u64) -> Self {
        self.debounce_interval_ms = ms;
        self
    }

    /// Sets the maximum session duration.
    #[must_use]
    pub fn with_max_session(mut self, secs: u64) -> Self {
        self.max_session_secs = secs;
        self
    }

    /// Sets the outbound channel capacity.
    #[must_use]
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Enables or disables metrics.
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Returns the default debounce interval.
    #[must_use]
    pub const fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    /// Returns the maximum session duration.
    #[must_use]
    pub const fn max_session_duration(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_interval_ms == 0 {
            return Err(ConfigError::InvalidDebounceInterval);
        }

        if self.max_session_secs == 0 {
            return Err(ConfigError::InvalidSessionDuration);
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidOutboundBuffer);
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid debounce interval.
    #[error("debounce_interval_ms must be > 0")]
    InvalidDebounceInterval,

    /// Invalid session duration.
    #[error("max_session_secs must be > 0")]
    InvalidSessionDuration,

    /// Invalid outbound buffer.
    #[error("outbound_buffer must be > 0")]
    InvalidOutboundBuffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_interval_ms, 1000);
        assert_eq!(config.max_session_secs, 1800);
        assert_eq!(config.outbound_buffer, 100);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = WatchConfig::default()
            .with_debounce_interval(250)
            .with_max_session(60)
            .with_outbound_buffer(16)
            .with_metrics(false);

        assert_eq!(config.debounce_interval(), Duration::from_millis(250));
        assert_eq!(config.max_session_duration(), Duration::from_secs(60));
        assert_eq!(config.outbound_buffer, 16);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_config_validate_valid() {
        let config = WatchConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_zero_debounce() {
        let config = WatchConfig::default().with_debounce_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_session() {
        let config = WatchConfig {
            max_session_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_buffer() {
        let config = WatchConfig::default().with_outbound_buffer(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialize() {
        let json = r#"{"debounce_interval_ms":50,"max_session_secs":10,"outbound_buffer":8,"metrics_enabled":false}"#;
        let config: WatchConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.debounce_interval_ms, 50);
        assert!(!config.metrics_enabled);
    }
}
