use std::sync::Arc;

use thiserror::Error;

use meterflow_core::{Labels, Sample, SeriesKey, TimeRange};

/// Time-series store operation error.
///
/// These are **infrastructure errors** (connectivity, command failures) as
/// opposed to domain errors (validation). `AlreadyExists` is the one kind
/// callers routinely treat as success, see [`ensure_series`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("series already exists: {0}")]
    AlreadyExists(String),

    #[error("series does not exist: {0}")]
    MissingSeries(String),

    #[error("connectivity probe failed: {0}")]
    Probe(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("malformed store reply: {0}")]
    Reply(String),
}

/// Key/value/time-series store shared by the ingestor and the forecaster.
///
/// Every method is a single store command; there are no transactions. The
/// store's per-command atomicity is the only guarantee callers rely on.
pub trait TimeSeriesStore: Send + Sync {
    /// Round-trip write/read of a probe key.
    fn probe(&self) -> Result<(), StoreError>;

    /// Create an empty series. Fails with [`StoreError::AlreadyExists`] when present.
    fn create_series(&self, key: &SeriesKey, labels: &Labels) -> Result<(), StoreError>;

    /// Bulk-append samples in one command; returns how many the store acknowledged.
    ///
    /// A sample whose timestamp is already present never overwrites the
    /// existing value. Whether it still counts as acknowledged is up to the
    /// backend (Redis with `DUPLICATE_POLICY FIRST` acknowledges it).
    fn append(&self, key: &SeriesKey, samples: &[Sample]) -> Result<usize, StoreError>;

    /// Samples within `range`, ascending by timestamp.
    fn range(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Sample>, StoreError>;

    /// Push `member` at the head of `queue`.
    fn push_queue(&self, queue: &str, member: &str) -> Result<(), StoreError>;

    /// Move the tail of `queue` to its head and return it (`None` when empty).
    fn rotate_queue(&self, queue: &str) -> Result<Option<String>, StoreError>;

    /// Members of `queue`, head first.
    fn queue_members(&self, queue: &str) -> Result<Vec<String>, StoreError>;
}

impl<S> TimeSeriesStore for Arc<S>
where
    S: TimeSeriesStore + ?Sized,
{
    fn probe(&self) -> Result<(), StoreError> {
        (**self).probe()
    }

    fn create_series(&self, key: &SeriesKey, labels: &Labels) -> Result<(), StoreError> {
        (**self).create_series(key, labels)
    }

    fn append(&self, key: &SeriesKey, samples: &[Sample]) -> Result<usize, StoreError> {
        (**self).append(key, samples)
    }

    fn range(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Sample>, StoreError> {
        (**self).range(key, range)
    }

    fn push_queue(&self, queue: &str, member: &str) -> Result<(), StoreError> {
        (**self).push_queue(queue, member)
    }

    fn rotate_queue(&self, queue: &str) -> Result<Option<String>, StoreError> {
        (**self).rotate_queue(queue)
    }

    fn queue_members(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        (**self).queue_members(queue)
    }
}

/// Outcome of [`ensure_series`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExisted,
}

/// Idempotent series creation: an existing series is a success, not an error.
pub fn ensure_series<S>(store: &S, key: &SeriesKey, labels: &Labels) -> Result<EnsureOutcome, StoreError>
where
    S: TimeSeriesStore + ?Sized,
{
    match store.create_series(key, labels) {
        Ok(()) => Ok(EnsureOutcome::Created),
        Err(StoreError::AlreadyExists(_)) => Ok(EnsureOutcome::AlreadyExisted),
        Err(e) => Err(e),
    }
}
