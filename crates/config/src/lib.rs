//! Configuration for the matching engine service
//!
//! A single YAML file with `${VAR}` environment substitution:
//!
//! ```yaml
//! engine:
//!   symbol: BTCUSDT
//!   queue_capacity: 65536
//!   halt_backoff_ms: 100
//!   idle_spins: 64
//!   idle_sleep_us: 50
//!   snapshot_depth: 20
//!   worker_thread_name: matching-worker
//! logging:
//!   format: pretty
//! metrics:
//!   enabled: false
//!   port: 9100
//! ```
//!
//! Only `engine.symbol` is required; every other field falls back to the
//! values in [`defaults`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Errors raised while reading or writing a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid substitution pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Root of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MatchingConfig {
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// `engine:` section
///
/// Tuning fields are optional in the file; the accessors resolve defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineSection {
    /// Symbol matched by this engine instance
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_spins: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_sleep_us: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_thread_name: Option<String>,
}

impl EngineSection {
    /// Section for `symbol` with every tuning field left to its default
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            queue_capacity: None,
            halt_backoff_ms: None,
            idle_spins: None,
            idle_sleep_us: None,
            snapshot_depth: None,
            worker_thread_name: None,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(default_queue_capacity)
    }

    pub fn halt_backoff_ms(&self) -> u64 {
        self.halt_backoff_ms.unwrap_or_else(default_halt_backoff_ms)
    }

    pub fn idle_spins(&self) -> u32 {
        self.idle_spins.unwrap_or_else(default_idle_spins)
    }

    pub fn idle_sleep_us(&self) -> u64 {
        self.idle_sleep_us.unwrap_or_else(default_idle_sleep_us)
    }

    pub fn snapshot_depth(&self) -> usize {
        self.snapshot_depth.unwrap_or_else(default_snapshot_depth)
    }

    pub fn worker_thread_name(&self) -> String {
        self.worker_thread_name
            .clone()
            .unwrap_or_else(default_worker_thread_name)
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            queue_capacity: Some(default_queue_capacity()),
            halt_backoff_ms: Some(default_halt_backoff_ms()),
            idle_spins: Some(default_idle_spins()),
            idle_sleep_us: Some(default_idle_sleep_us()),
            snapshot_depth: Some(default_snapshot_depth()),
            worker_thread_name: Some(default_worker_thread_name()),
        }
    }
}

/// `logging:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingSection {
    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

/// `metrics:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
engine:
  symbol: ETHUSDT
  queue_capacity: 1024
  halt_backoff_ms: 250
  idle_spins: 8
  idle_sleep_us: 10
  snapshot_depth: 5
  worker_thread_name: eth-matcher
logging:
  format: json
metrics:
  enabled: true
  port: 9200
"#;
        let config: MatchingConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.engine.symbol, "ETHUSDT");
        assert_eq!(config.engine.queue_capacity(), 1024);
        assert_eq!(config.engine.halt_backoff_ms(), 250);
        assert_eq!(config.engine.idle_spins(), 8);
        assert_eq!(config.engine.idle_sleep_us(), 10);
        assert_eq!(config.engine.snapshot_depth(), 5);
        assert_eq!(config.engine.worker_thread_name(), "eth-matcher");
        assert_eq!(config.logging.format, "json");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9200);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MatchingConfig = serde_yaml::from_str("engine:\n  symbol: BTCUSDT\n").unwrap();

        assert_eq!(config.engine.queue_capacity(), default_queue_capacity());
        assert_eq!(config.engine.worker_thread_name(), "matching-worker");
        assert_eq!(config.logging, LoggingSection::default());
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
    }

    #[test]
    fn test_missing_symbol_fails_to_parse() {
        let result: Result<MatchingConfig, _> = serde_yaml::from_str("engine:\n  queue_capacity: 8\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let section = EngineSection::for_symbol("BTCUSDT");
        let yaml = serde_yaml::to_string(&section).unwrap();
        assert!(yaml.contains("symbol: BTCUSDT"));
        assert!(!yaml.contains("queue_capacity"));
    }
}
