//! `meterflow-core`: shared vocabulary of the ingest/forecast pipeline.
//!
//! This crate contains **pure** primitives (no store, no I/O): device
//! identifiers, series keys, samples, windowing and input parsing.

pub mod error;
pub mod id;
pub mod sample;
pub mod timestamp;
pub mod value;
pub mod window;

pub use error::{DomainError, DomainResult};
pub use id::{DeviceId, SeriesKey};
pub use sample::{Labels, Sample, TimeRange};
pub use timestamp::parse_timestamp_ms;
pub use value::parse_value;
pub use window::{TrainingSet, Window};
