//! Infrastructure layer: store adapters, blob sources, config, and the two
//! pipeline stages (ingest, forecast) with their tick scheduler.

pub mod blob;
pub mod config;
pub mod forecast;
pub mod ingest;
pub mod schedule;
pub mod store;
