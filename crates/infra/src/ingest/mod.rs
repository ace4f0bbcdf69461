//! Ingestor: blob table → one raw series per device + work-queue entries.
//!
//! ## Flow
//!
//! 1. Stream-parse the source (row by row, truncated to `max_columns`).
//! 2. Reshape: header cells become device ids, column 0 becomes timestamps.
//! 3. Per device: ensure the raw series (idempotent), bulk-append its points,
//!    push the device into the rotating queue.
//!
//! There is no rollback: points appended before a failure stay in the store.

pub mod table;

use thiserror::Error;
use tracing::{info, instrument};

use meterflow_core::{Labels, SeriesKey};

use crate::blob::{BlobError, BlobSource};
use crate::store::{EnsureOutcome, StoreError, TimeSeriesStore, ensure_series};

pub use table::{DeviceColumn, DeviceTable, TableFormat, read_device_table};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source is empty (no header row)")]
    EmptySource,

    #[error("invalid header: {0}")]
    Header(String),

    #[error("malformed source: {0}")]
    Parse(String),

    #[error("invalid ingest configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where to read from and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub bucket: String,
    pub object: String,
    /// Columns kept per row (label column included).
    pub max_columns: usize,
    pub delimiter: u8,
    /// Rotating work-queue key.
    pub queue: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bucket: "meter-data".to_string(),
            object: "devices.csv".to_string(),
            max_columns: 11,
            delimiter: b';',
            queue: "device_queue".to_string(),
        }
    }
}

/// Totals of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub devices: usize,
    pub series_created: usize,
    pub points_written: usize,
    pub queued: usize,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub values_dropped: usize,
}

pub struct Ingestor<S, B> {
    store: S,
    source: B,
    config: IngestConfig,
}

impl<S, B> Ingestor<S, B>
where
    S: TimeSeriesStore,
    B: BlobSource,
{
    pub fn new(store: S, source: B, config: IngestConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run one ingestion pass over the configured object.
    #[instrument(skip(self), fields(bucket = %self.config.bucket, object = %self.config.object), err)]
    pub fn run(&self) -> Result<IngestReport, IngestError> {
        info!("reading source table");
        let reader = self.source.open(&self.config.bucket, &self.config.object)?;
        let table = read_device_table(
            reader,
            TableFormat {
                max_columns: self.config.max_columns,
                delimiter: self.config.delimiter,
            },
        )?;
        info!(
            devices = table.columns.len(),
            rows = table.rows_read,
            skipped = table.rows_skipped,
            dropped = table.values_dropped,
            "source table parsed"
        );

        let mut report = IngestReport {
            devices: table.columns.len(),
            rows_read: table.rows_read,
            rows_skipped: table.rows_skipped,
            values_dropped: table.values_dropped,
            ..IngestReport::default()
        };

        for column in &table.columns {
            self.write_device(column, &mut report)?;
        }

        info!(
            devices = report.devices,
            points = report.points_written,
            queued = report.queued,
            "finished writing dataset"
        );
        Ok(report)
    }

    fn write_device(&self, column: &DeviceColumn, report: &mut IngestReport) -> Result<(), IngestError> {
        let key = SeriesKey::raw(&column.device);
        info!(device = %column.device, key = %key, points = column.samples.len(), "writing device series");

        if ensure_series(&self.store, &key, &Labels::device(&column.device))? == EnsureOutcome::Created {
            report.series_created += 1;
        }
        if column.samples.is_empty() {
            return Ok(());
        }

        report.points_written += self.store.append(&key, &column.samples)?;
        self.store
            .push_queue(&self.config.queue, &column.device.queue_member())?;
        report.queued += 1;
        Ok(())
    }
}
