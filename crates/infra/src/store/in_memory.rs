use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;

use meterflow_core::{Labels, Sample, SeriesKey, TimeRange};

use super::r#trait::{StoreError, TimeSeriesStore};

const PROBE_KEY: &str = "meterflow:probe";
const PROBE_VALUE: &str = "ok";

#[derive(Debug, Default)]
struct Series {
    labels: Labels,
    points: BTreeMap<i64, f64>,
}

#[derive(Debug, Default)]
struct State {
    series: HashMap<SeriesKey, Series>,
    queues: HashMap<String, VecDeque<String>>,
    values: HashMap<String, String>,
}

/// In-memory time-series store.
///
/// Intended for tests/dev. Mirrors the command semantics of the Redis store:
/// block-on-duplicate appends, head-pushed queues, tail-to-head rotation.
#[derive(Debug, Default)]
pub struct InMemoryTimeSeriesStore {
    state: RwLock<State>,
}

impl InMemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels of an existing series (inspection helper).
    pub fn labels(&self, key: &SeriesKey) -> Option<Labels> {
        let state = self.state.read().ok()?;
        state.series.get(key).map(|s| s.labels.clone())
    }

    /// Number of series in the store.
    pub fn series_count(&self) -> usize {
        self.state.read().map(|s| s.series.len()).unwrap_or(0)
    }

    fn poisoned() -> StoreError {
        StoreError::Connection("lock poisoned".to_string())
    }
}

impl TimeSeriesStore for InMemoryTimeSeriesStore {
    fn probe(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state
            .values
            .insert(PROBE_KEY.to_string(), PROBE_VALUE.to_string());
        match state.values.get(PROBE_KEY) {
            Some(v) if v == PROBE_VALUE => Ok(()),
            other => Err(StoreError::Probe(format!("read back {other:?}"))),
        }
    }

    fn create_series(&self, key: &SeriesKey, labels: &Labels) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.series.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        state.series.insert(
            key.clone(),
            Series {
                labels: labels.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn append(&self, key: &SeriesKey, samples: &[Sample]) -> Result<usize, StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let series = state
            .series
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingSeries(key.to_string()))?;

        let mut accepted = 0;
        for s in samples {
            if let std::collections::btree_map::Entry::Vacant(slot) = series.points.entry(s.timestamp_ms) {
                slot.insert(s.value);
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn range(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Sample>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let series = state
            .series
            .get(key)
            .ok_or_else(|| StoreError::MissingSeries(key.to_string()))?;
        Ok(series
            .points
            .iter()
            .filter(|(ts, _)| range.contains(**ts))
            .map(|(ts, v)| Sample::new(*ts, *v))
            .collect())
    }

    fn push_queue(&self, queue: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(member.to_string());
        Ok(())
    }

    fn rotate_queue(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let Some(q) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(member) = q.pop_back() else {
            return Ok(None);
        };
        q.push_front(member.clone());
        Ok(Some(member))
    }

    fn queue_members(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EnsureOutcome, ensure_series};
    use meterflow_core::DeviceId;
    use proptest::prelude::*;

    fn key() -> SeriesKey {
        SeriesKey::raw(&DeviceId::parse("devA").unwrap())
    }

    #[test]
    fn probe_round_trips() {
        InMemoryTimeSeriesStore::new().probe().unwrap();
    }

    #[test]
    fn ensure_series_twice_is_idempotent() {
        let store = InMemoryTimeSeriesStore::new();
        let labels = Labels::new().with("device_id", "devA");
        assert_eq!(ensure_series(&store, &key(), &labels).unwrap(), EnsureOutcome::Created);
        assert_eq!(
            ensure_series(&store, &key(), &labels).unwrap(),
            EnsureOutcome::AlreadyExisted
        );
        assert_eq!(store.series_count(), 1);
        assert_eq!(store.labels(&key()).unwrap(), labels);
    }

    #[test]
    fn create_series_reports_typed_conflict() {
        let store = InMemoryTimeSeriesStore::new();
        store.create_series(&key(), &Labels::new()).unwrap();
        assert!(matches!(
            store.create_series(&key(), &Labels::new()),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn append_requires_the_series() {
        let store = InMemoryTimeSeriesStore::new();
        assert!(matches!(
            store.append(&key(), &[Sample::new(1, 1.0)]),
            Err(StoreError::MissingSeries(_))
        ));
        assert!(matches!(store.range(&key(), TimeRange::all()), Err(StoreError::MissingSeries(_))));
    }

    #[test]
    fn duplicates_are_rejected_not_overwritten() {
        let store = InMemoryTimeSeriesStore::new();
        store.create_series(&key(), &Labels::new()).unwrap();
        assert_eq!(store.append(&key(), &[Sample::new(1, 1.0), Sample::new(2, 2.0)]).unwrap(), 2);
        assert_eq!(store.append(&key(), &[Sample::new(2, 9.0), Sample::new(3, 3.0)]).unwrap(), 1);
        let got = store.range(&key(), TimeRange::all()).unwrap();
        assert_eq!(got, vec![Sample::new(1, 1.0), Sample::new(2, 2.0), Sample::new(3, 3.0)]);
    }

    #[test]
    fn range_filters_inclusively() {
        let store = InMemoryTimeSeriesStore::new();
        store.create_series(&key(), &Labels::new()).unwrap();
        let samples: Vec<Sample> = (0..10).map(|i| Sample::new(i * 10, i as f64)).collect();
        store.append(&key(), &samples).unwrap();
        let got = store.range(&key(), TimeRange::between(20, 40)).unwrap();
        assert_eq!(got.iter().map(|s| s.timestamp_ms).collect::<Vec<_>>(), vec![20, 30, 40]);
    }

    #[test]
    fn rotate_on_empty_queue_is_none() {
        let store = InMemoryTimeSeriesStore::new();
        assert_eq!(store.rotate_queue("q").unwrap(), None);
    }

    #[test]
    fn rotate_returns_oldest_and_requeues_it() {
        let store = InMemoryTimeSeriesStore::new();
        for m in ["a", "b", "c"] {
            store.push_queue("q", m).unwrap();
        }
        assert_eq!(store.queue_members("q").unwrap(), vec!["c", "b", "a"]);
        assert_eq!(store.rotate_queue("q").unwrap().as_deref(), Some("a"));
        assert_eq!(store.queue_members("q").unwrap(), vec!["a", "c", "b"]);
        assert_eq!(store.rotate_queue("q").unwrap().as_deref(), Some("b"));
        assert_eq!(store.rotate_queue("q").unwrap().as_deref(), Some("c"));
        assert_eq!(store.queue_members("q").unwrap(), vec!["c", "b", "a"]);
    }

    proptest! {
        #[test]
        fn rotation_preserves_composition(members in proptest::collection::vec("[a-z]{1,4}", 0..12), turns in 0usize..30) {
            let store = InMemoryTimeSeriesStore::new();
            for m in &members {
                store.push_queue("q", m).unwrap();
            }
            let before = store.queue_members("q").unwrap();
            for _ in 0..turns {
                store.rotate_queue("q").unwrap();
            }
            let mut after = store.queue_members("q").unwrap();
            let mut sorted_before = before.clone();
            sorted_before.sort();
            after.sort();
            prop_assert_eq!(sorted_before, after);

            // A full cycle restores the exact order.
            let full = store.queue_members("q").unwrap().len();
            let snapshot = store.queue_members("q").unwrap();
            for _ in 0..full {
                store.rotate_queue("q").unwrap();
            }
            prop_assert_eq!(snapshot, store.queue_members("q").unwrap());
        }
    }
}
