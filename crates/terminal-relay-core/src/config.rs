//! Configuration types for Terminal Relay.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Relay configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Session lifecycle settings
    pub session: SessionSettings,
    /// Terminal settings
    pub terminal: TerminalSettings,
}

impl RelayConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: RelayConfig =
            serde_yaml::from_str(yaml).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.session.grace_ms == 0 || self.session.short_grace_ms == 0 {
            return Err(crate::Error::Config(
                "session grace periods must be > 0".to_string(),
            ));
        }
        if self.session.short_grace_ms > self.session.grace_ms {
            return Err(crate::Error::Config(
                "session.short_grace_ms must not exceed session.grace_ms".to_string(),
            ));
        }
        if self.session.replay_max_bytes == 0 {
            return Err(crate::Error::Config(
                "session.replay_max_bytes must be > 0".to_string(),
            ));
        }
        if self.session.orphan_reply_window_ms >= self.session.orphan_barrier_timeout_ms {
            return Err(crate::Error::Config(
                "session.orphan_reply_window_ms must be below the barrier timeout".to_string(),
            ));
        }
        if self.terminal.default_rows == 0 || self.terminal.default_cols == 0 {
            return Err(crate::Error::Config(
                "terminal dimensions must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Reconnect grace period after the last observer detaches, in ms
    pub grace_ms: u64,
    /// Reduced grace period once a fresh client connection arrives, in ms
    pub short_grace_ms: u64,
    /// Auto-open timeout for the orphan-question latch, in ms
    pub orphan_barrier_timeout_ms: u64,
    /// Window after latch open within which a reply counts as live, in ms
    pub orphan_reply_window_ms: u64,
    /// Byte budget for per-session replay history
    pub replay_max_bytes: usize,
    /// Batching window for output coalescing, in ms
    pub coalesce_window_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_ms: 60_000,
            short_grace_ms: 6_000,
            orphan_barrier_timeout_ms: 4_000,
            orphan_reply_window_ms: 500,
            replay_max_bytes: 1024 * 1024,
            coalesce_window_ms: 5,
        }
    }
}

impl SessionSettings {
    /// Reconnect grace period.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Reduced grace period.
    pub fn short_grace(&self) -> Duration {
        Duration::from_millis(self.short_grace_ms)
    }

    /// Orphan latch auto-open timeout.
    pub fn orphan_barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.orphan_barrier_timeout_ms)
    }

    /// Orphan reply freshness window.
    pub fn orphan_reply_window(&self) -> Duration {
        Duration::from_millis(self.orphan_reply_window_ms)
    }

    /// Output coalescing window.
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

/// Terminal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Default terminal rows
    pub default_rows: u16,
    /// Default terminal columns
    pub default_cols: u16,
    /// TERM environment variable value
    pub term: String,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            default_rows: 24,
            default_cols: 80,
            term: "xterm-256color".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.session.grace_ms, 60_000);
        assert_eq!(config.session.short_grace_ms, 6_000);
        assert_eq!(config.session.replay_max_bytes, 1024 * 1024);
        assert_eq!(config.terminal.default_rows, 24);
        assert_eq!(config.terminal.default_cols, 80);
    }

    #[test]
    fn test_config_validation() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_grace_periods() {
        let mut config = RelayConfig::default();
        config.session.grace_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.session.short_grace_ms = config.session.grace_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_reply_window() {
        let mut config = RelayConfig::default();
        config.session.orphan_reply_window_ms = config.session.orphan_barrier_timeout_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = RelayConfig::default();
        config.terminal.default_rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
session:
  grace_ms: 30000
  short_grace_ms: 3000
  orphan_barrier_timeout_ms: 2000
  orphan_reply_window_ms: 250
  replay_max_bytes: 65536
  coalesce_window_ms: 10

terminal:
  default_rows: 30
  default_cols: 120
  term: "xterm-256color"
"#;

        let config = RelayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.session.grace_ms, 30_000);
        assert_eq!(config.session.short_grace_ms, 3_000);
        assert_eq!(config.session.replay_max_bytes, 65_536);
        assert_eq!(config.session.coalesce_window(), Duration::from_millis(10));
        assert_eq!(config.terminal.default_rows, 30);
        assert_eq!(config.terminal.default_cols, 120);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RelayConfig::from_yaml("session:\n  grace_ms: 10000\n").unwrap();
        assert_eq!(config.session.grace_ms, 10_000);
        assert_eq!(config.session.short_grace_ms, 6_000);
    }
}
