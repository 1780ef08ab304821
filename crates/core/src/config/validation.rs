//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::CacheConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `db_path` is empty
    /// - `max_total_bytes` is 0
    /// - `retention_days` is less than 1 or more than 10 years
    /// - `busy_timeout_ms` exceeds 10 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "db_path".into(), reason: "must not be empty".into() });
        }

        if self.max_total_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_total_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_total_bytes > i64::MAX as u64 {
            return Err(ConfigError::Invalid {
                field: "max_total_bytes".into(),
                reason: "must fit in a signed 64-bit integer".into(),
            });
        }

        if self.retention_days < 1 {
            return Err(ConfigError::Invalid { field: "retention_days".into(), reason: "must be at least 1".into() });
        }
        if self.retention_days > 3650 {
            return Err(ConfigError::Invalid {
                field: "retention_days".into(),
                reason: "must not exceed 3650 days".into(),
            });
        }

        if self.busy_timeout_ms > 600_000 {
            return Err(ConfigError::Invalid {
                field: "busy_timeout_ms".into(),
                reason: "must not exceed 10 minutes (600000ms)".into(),
            });
        }
        if self.busy_timeout_ms == 0 {
            tracing::warn!("busy_timeout_ms is 0; concurrent writers will fail immediately with SQLITE_BUSY");
        }

        Ok(())
    }
}
