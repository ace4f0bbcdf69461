//! Strongly-typed identifiers and store keys.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Prefix shared by queue members and series keys.
pub const KEY_PREFIX: &str = "ts:";

const RAW_SUFFIX: &str = "_real";
const FORECAST_SUFFIX: &str = "_forecasted";

/// Identifier of a device (one data column of the source table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse a device id; surrounding whitespace is trimmed, empty ids are rejected.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("DeviceId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Recover the device id from a work-queue member (`ts:{device}`).
    ///
    /// Members pushed by other producers without the prefix are taken verbatim.
    pub fn from_queue_member(member: &str) -> Result<Self, DomainError> {
        Self::parse(member.strip_prefix(KEY_PREFIX).unwrap_or(member))
    }

    /// The work-queue member for this device.
    pub fn queue_member(&self) -> String {
        format!("{KEY_PREFIX}{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Key of a time series in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Raw (ingested) series of a device: `ts:{device}_real`.
    pub fn raw(device: &DeviceId) -> Self {
        Self(format!("{KEY_PREFIX}{device}{RAW_SUFFIX}"))
    }

    /// Forecast series of a device: `ts:{device}_forecasted`.
    pub fn forecast(device: &DeviceId) -> Self {
        Self(format!("{KEY_PREFIX}{device}{FORECAST_SUFFIX}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SeriesKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
