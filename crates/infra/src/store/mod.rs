//! Time-series store boundary.
//!
//! This module defines the store abstraction shared by the ingestor and the
//! forecaster, an in-memory implementation for tests/dev, and (behind the
//! `redis` feature) a RedisTimeSeries-backed implementation.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_ts;
pub mod r#trait;

pub use in_memory::InMemoryTimeSeriesStore;
#[cfg(feature = "redis")]
pub use redis_ts::RedisTimeSeriesStore;
pub use r#trait::{EnsureOutcome, StoreError, TimeSeriesStore, ensure_series};
