//! SQLite-backed memoization cache.
//!
//! This module provides a persistent, content-addressed get-or-compute cache
//! backed by a single SQLite file. It supports:
//!
//! - Content-addressed keys using SHA-256 hashing
//! - Schema fingerprinting with automatic store rebuild on drift
//! - WAL mode and IMMEDIATE transactions for cross-process safety
//! - Age-based sweeping and size-bound LRU eviction

pub mod clock;
pub mod connection;
pub mod engine;
pub mod eviction;
pub mod hash;
pub mod schema;
pub mod stats;
pub mod value;

pub use crate::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::StoreHandle;
pub use engine::CacheEngine;
pub use eviction::{EvictionCandidate, EvictionPlan, EvictionPolicy};
pub use stats::CacheStats;
pub use value::{CacheValue, Json};
