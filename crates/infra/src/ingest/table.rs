//! Streaming reshaping of a delimited table into per-device sample lists.
//!
//! Layout: the header row names the devices (column 0 is the label column,
//! e.g. `DATETIME`), every following row is one timestamp with one value per
//! device. Rows are read one at a time and truncated to the column limit.

use std::collections::HashSet;
use std::io::Read;

use tracing::debug;

use meterflow_core::{DeviceId, Sample, parse_timestamp_ms, parse_value};

use super::IngestError;

/// One device column with its parsed samples, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceColumn {
    pub device: DeviceId,
    pub samples: Vec<Sample>,
}

/// Result of reshaping the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceTable {
    pub label: String,
    pub columns: Vec<DeviceColumn>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub values_dropped: usize,
}

/// Parsing options.
#[derive(Debug, Copy, Clone)]
pub struct TableFormat {
    pub max_columns: usize,
    pub delimiter: u8,
}

pub fn read_device_table<R: Read>(reader: R, format: TableFormat) -> Result<DeviceTable, IngestError> {
    if format.max_columns < 2 {
        return Err(IngestError::Config(
            "max_columns must leave room for the label column and one device".to_string(),
        ));
    }

    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(format.delimiter)
        .from_reader(reader);

    let mut records = csv.records();
    let header_record = match records.next() {
        Some(r) => r.map_err(|e| IngestError::Parse(e.to_string()))?,
        None => return Err(IngestError::EmptySource),
    };
    let header: Vec<&str> = header_record.iter().take(format.max_columns).collect();

    let mut table = DeviceTable {
        label: header.first().map(|s| s.trim().to_string()).unwrap_or_default(),
        ..DeviceTable::default()
    };
    let mut seen = HashSet::new();
    for (idx, name) in header.iter().enumerate().skip(1) {
        let device = DeviceId::parse(name)
            .map_err(|_| IngestError::Header(format!("column {idx} has an empty device name")))?;
        if !seen.insert(device.clone()) {
            return Err(IngestError::Header(format!("device {device} appears twice")));
        }
        table.columns.push(DeviceColumn {
            device,
            samples: Vec::new(),
        });
    }
    if table.columns.is_empty() {
        return Err(IngestError::Header("no device columns".to_string()));
    }

    for record in records {
        let record = record.map_err(|e| IngestError::Parse(e.to_string()))?;
        table.rows_read += 1;

        let mut cells = record.iter().take(format.max_columns);
        let Some(ts) = cells.next().and_then(parse_timestamp_ms) else {
            debug!(row = table.rows_read, "skipping row without a parseable timestamp");
            table.rows_skipped += 1;
            continue;
        };

        let mut present = 0;
        for (column, cell) in table.columns.iter_mut().zip(cells) {
            present += 1;
            match parse_value(cell) {
                Some(v) => column.samples.push(Sample::new(ts, v)),
                None => table.values_dropped += 1,
            }
        }
        // Short rows: the missing cells count as dropped values.
        table.values_dropped += table.columns.len() - present;
    }

    Ok(table)
}
