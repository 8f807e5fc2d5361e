// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the backend bridge.
//!
//! # Example
//!
//! ```
//! use backend_bridge::BridgeConfig;
//!
//! // Minimal config (uses defaults)
//! let config = BridgeConfig::default();
//! assert_eq!(config.cache.local_max_bytes, 100 * 1024 * 1024); // 100 MB
//! assert_eq!(config.circuit.failure_threshold, 5);
//!
//! // Partial JSON, everything else defaulted
//! let config = BridgeConfig::from_json_str(r#"{
//!     "cache": { "redis_url": "redis://localhost:6379", "environment": "production" },
//!     "retry": { "max_retries": 5 }
//! }"#).unwrap();
//! assert_eq!(config.retry.max_retries, 5);
//! assert_eq!(config.metrics.flush_count, 100);
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::metrics::MetricsConfig;
use crate::migration::MigrationOptions;
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("invalid capability profile '{name}': {reason}")]
    Profile { name: String, reason: String },
}

/// Top-level configuration shared by every provider built on the bridge.
///
/// All sections have defaults, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    /// Per-operation circuit breaker settings
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Retry policy applied to every provider call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Two-tier cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Metrics buffering and retention
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Defaults for migration runs
    #[serde(default)]
    pub migration: MigrationOptions,
}

impl BridgeConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "circuit.failure_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.cache.local_max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.local_max_bytes",
                reason: "must be greater than zero".into(),
            });
        }
        if self.metrics.flush_count == 0 {
            return Err(ConfigError::Invalid {
                field: "metrics.flush_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.metrics.retention.is_zero() {
            return Err(ConfigError::Invalid {
                field: "metrics.retention_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.migration.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "migration.batch_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Serde helper: `Duration` as integer milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Environment;
    use std::time::Duration;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = BridgeConfig::from_json_str("{}").unwrap();

        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.circuit.open_duration, Duration::from_secs(60));
        assert_eq!(config.circuit.half_open_after, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.cache.local_max_bytes, 100 * 1024 * 1024);
        assert_eq!(config.cache.environment, Environment::Development);
        assert_eq!(config.metrics.flush_count, 100);
        assert_eq!(config.metrics.flush_interval, Duration::from_secs(60));
        assert_eq!(config.metrics.retention, Duration::from_secs(3600));
        assert_eq!(config.migration.batch_size, 500);
        assert!(config.migration.concurrent);
    }

    #[test]
    fn test_millisecond_fields() {
        let config = BridgeConfig::from_json_str(
            r#"{"circuit": {"open_duration_ms": 250, "half_open_after_ms": 100}}"#,
        )
        .unwrap();

        assert_eq!(config.circuit.open_duration, Duration::from_millis(250));
        assert_eq!(config.circuit.half_open_after, Duration::from_millis(100));
        // Untouched field keeps its default
        assert_eq!(config.circuit.failure_threshold, 5);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = BridgeConfig::from_json_str(r#"{"circuit": {"failure_threshold": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "circuit.failure_threshold", .. }));
    }

    #[test]
    fn test_migration_section() {
        let config = BridgeConfig::from_json_str(
            r#"{"migration": {"dry_run": true, "collections": ["posts"]}}"#,
        )
        .unwrap();
        assert!(config.migration.dry_run);
        assert_eq!(config.migration.collections, Some(vec!["posts".to_string()]));

        let err = BridgeConfig::from_json_str(r#"{"migration": {"batch_size": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "migration.batch_size", .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = BridgeConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
