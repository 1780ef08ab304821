//! Unified error types for memocache.
//!
//! Every variant's display text starts with a stable code so that callers
//! (and the CLI's stderr output) can tell store failures apart from misses
//! and bad input without matching on the enum.

use std::path::PathBuf;

/// Unified error type for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty cache key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry exists for the given key.
    ///
    /// The engine itself never returns this for an ordinary miss; it exists
    /// for lookup-only callers that want a miss to abort the transaction.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// SQLite operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem operation on the store failed.
    #[error("STORE_ERROR: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A computed value could not be serialized for storage.
    #[error("STORE_ERROR: failed to encode value: {0}")]
    Encode(String),

    /// A stored blob could not be deserialized into the requested type.
    #[error("STORE_ERROR: failed to decode value: {0}")]
    Decode(String),
}

impl Error {
    /// Stable error code, the prefix of the display text.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::CacheMiss(_) => "CACHE_MISS",
            Error::Database(_) | Error::Io { .. } | Error::Encode(_) | Error::Decode(_) => "STORE_ERROR",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("abc123".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(Error::CacheMiss("x".into()).code(), "CACHE_MISS");
        assert_eq!(Error::Encode("x".into()).code(), "STORE_ERROR");
        assert_eq!(Error::Decode("x".into()).code(), "STORE_ERROR");

        let err = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.code(), "STORE_ERROR");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "/nonexistent/store.db",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.starts_with("STORE_ERROR"));
        assert!(text.contains("/nonexistent/store.db"));
    }
}
