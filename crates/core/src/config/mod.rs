//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MEMOCACHE_*)
//! 2. TOML config file (if MEMOCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Default size budget: 100 MiB.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 100 << 20;

/// Default retention window for untouched entries.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MEMOCACHE_*)
/// 2. TOML config file (if MEMOCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite store file.
    ///
    /// Set via MEMOCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Total size budget for stored values, in bytes.
    ///
    /// Set via MEMOCACHE_MAX_TOTAL_BYTES environment variable.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    /// Entries not accessed for this many days are swept.
    ///
    /// Set via MEMOCACHE_RETENTION_DAYS environment variable.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// How long to wait for another process's write lock, in milliseconds.
    ///
    /// Set via MEMOCACHE_BUSY_TIMEOUT_MS environment variable.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(".memocache.db")
}

fn default_max_total_bytes() -> u64 {
    DEFAULT_MAX_TOTAL_BYTES
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_busy_timeout_ms() -> u64 {
    60_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_total_bytes: default_max_total_bytes(),
            retention_days: default_retention_days(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Defaults with the store placed at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { db_path: path.into(), ..Default::default() }
    }

    /// Busy timeout as Duration for SQLite.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Retention window in seconds, saturating for out-of-range day counts.
    pub fn retention_secs(&self) -> i64 {
        self.retention_days.saturating_mul(SECONDS_PER_DAY)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MEMOCACHE_`
    /// 2. TOML file from `MEMOCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MEMOCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MEMOCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.db_path, std::env::temp_dir().join(".memocache.db"));
        assert_eq!(config.max_total_bytes, 104_857_600);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.busy_timeout_ms, 60_000);
    }

    #[test]
    fn test_derived_durations() {
        let config = CacheConfig::default();
        assert_eq!(config.busy_timeout(), Duration::from_secs(60));
        assert_eq!(config.retention_secs(), 30 * 86_400);

        let huge = CacheConfig { retention_days: i64::MAX / 1000, ..Default::default() };
        assert_eq!(huge.retention_secs(), i64::MAX);
    }

    #[test]
    fn test_at_overrides_only_path() {
        let config = CacheConfig::at("/var/tmp/render-cache.db");
        assert_eq!(config.db_path, PathBuf::from("/var/tmp/render-cache.db"));
        assert_eq!(config.max_total_bytes, DEFAULT_MAX_TOTAL_BYTES);
    }

    #[test]
    fn test_load_layers() {
        Jail::expect_with(|jail| {
            jail.create_file("memocache.toml", "max_total_bytes = 2048\nretention_days = 7\n")?;
            jail.set_env("MEMOCACHE_CONFIG_FILE", "memocache.toml");
            jail.set_env("MEMOCACHE_DB_PATH", "/tmp/jail-cache.db");
            jail.set_env("MEMOCACHE_RETENTION_DAYS", "3");

            let config = CacheConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.db_path, PathBuf::from("/tmp/jail-cache.db"));
            assert_eq!(config.max_total_bytes, 2048);
            assert_eq!(config.retention_days, 3);
            assert_eq!(config.busy_timeout_ms, 60_000);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid() {
        Jail::expect_with(|jail| {
            jail.set_env("MEMOCACHE_MAX_TOTAL_BYTES", "0");
            let result = CacheConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { ref field, .. }) if field == "max_total_bytes"));
            Ok(())
        });
    }
}
