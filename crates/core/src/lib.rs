//! Core types and shared functionality for memocache.
//!
//! This crate provides:
//! - The persistent get-or-compute cache engine with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheEngine, CacheStats, CacheValue, Json, StoreHandle};
pub use config::CacheConfig;
pub use error::Error;
