//! Forecaster: rotating-queue driven next-value forecasts.
//!
//! Each tick visits one device (the queue rotates by one), runs the shared
//! model over the window ending at that device's cursor, and appends the
//! prediction to `ts:{device}_forecasted`. The model is obtained once, on
//! the first tick that finds a device (bootstrap).

pub mod cursor;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use meterflow_ai::{AiError, AiJob, ForecastJob, ModelSource};
use meterflow_core::{DeviceId, Labels, Sample, SeriesKey, TimeRange, Window};

use crate::schedule::{Tick, TickContext, TickOutcome};
use crate::store::{EnsureOutcome, StoreError, TimeSeriesStore, ensure_series};

pub use cursor::{forecast_timestamp, resume_cursor};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ai(#[from] AiError),
}

#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Rotating work-queue key.
    pub queue: String,
    /// Input window, shared by training and inference.
    pub window: Window,
    /// Spacing of synthetic forecast timestamps.
    pub step: Duration,
}

impl ForecastConfig {
    pub fn step_ms(&self) -> i64 {
        i64::try_from(self.step.as_millis()).unwrap_or(i64::MAX)
    }
}

pub struct Forecaster<S, P: ModelSource> {
    store: S,
    models: P,
    config: ForecastConfig,
    model: Option<P::Model>,
    cursors: HashMap<DeviceId, usize>,
    ensured: HashSet<DeviceId>,
}

impl<S, P> Forecaster<S, P>
where
    S: TimeSeriesStore,
    P: ModelSource,
{
    pub fn new(store: S, models: P, config: ForecastConfig) -> Self {
        Self {
            store,
            models,
            config,
            model: None,
            cursors: HashMap::new(),
            ensured: HashSet::new(),
        }
    }

    /// Probe the store, then build the forecaster. A failed probe is fatal.
    pub fn connect(store: S, models: P, config: ForecastConfig) -> Result<Self, ForecastError> {
        store.probe()?;
        info!(queue = %config.queue, window = config.window.length(), "store probe succeeded");
        Ok(Self::new(store, models, config))
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.model.is_some()
    }

    /// Next cursor for `device`, once it has been visited.
    pub fn cursor(&self, device: &DeviceId) -> Option<usize> {
        self.cursors.get(device).copied()
    }

    fn next_device(&self) -> Result<Option<DeviceId>, ForecastError> {
        let Some(member) = self.store.rotate_queue(&self.config.queue)? else {
            return Ok(None);
        };
        match DeviceId::from_queue_member(&member) {
            Ok(device) => Ok(Some(device)),
            Err(e) => {
                warn!(member = %member, error = %e, "skipping malformed queue member");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, raw), fields(points = raw.len()))]
    fn bootstrap(&mut self, device: &DeviceId, raw: &[Sample]) -> Result<(), ForecastError> {
        let values: Vec<f64> = raw.iter().map(|s| s.value).collect();
        let training = self.config.window.training_pairs(&values);
        info!(pairs = training.len(), "obtaining model");
        let model = self.models.obtain(&training)?;
        self.model = Some(model);
        Ok(())
    }

    /// Create the forecast series on the first visit to `device`.
    fn ensure_forecast_series(&mut self, device: &DeviceId) -> Result<(), ForecastError> {
        if self.ensured.contains(device) {
            return Ok(());
        }
        let key = SeriesKey::forecast(device);
        match ensure_series(&self.store, &key, &Labels::device(device))? {
            EnsureOutcome::Created => info!(key = %key, "created forecast series"),
            EnsureOutcome::AlreadyExisted => debug!(key = %key, "forecast series already exists"),
        }
        self.ensured.insert(device.clone());
        Ok(())
    }

    fn cursor_for(&mut self, device: &DeviceId, raw: &[Sample]) -> Result<usize, ForecastError> {
        if let Some(c) = self.cursors.get(device) {
            return Ok(*c);
        }
        let existing = self
            .store
            .range(&SeriesKey::forecast(device), TimeRange::all())?;
        let c = resume_cursor(
            self.config.window.length(),
            raw,
            existing.last().map(|s| s.timestamp_ms),
            self.config.step_ms(),
        );
        if c > self.config.window.length() {
            info!(device = %device, cursor = c, "resuming after existing forecasts");
        }
        self.cursors.insert(device.clone(), c);
        Ok(c)
    }
}

impl<S, P> Tick for Forecaster<S, P>
where
    S: TimeSeriesStore,
    P: ModelSource,
{
    type Error = ForecastError;

    fn tick(&mut self, ctx: &TickContext) -> Result<TickOutcome, ForecastError> {
        if ctx.deadline_passed() {
            return Ok(TickOutcome::Aborted);
        }
        if let Some(model) = &self.model {
            self.models.validate(model, self.config.window.length())?;
        }

        let Some(device) = self.next_device()? else {
            info!(queue = %self.config.queue, "device queue is empty; waiting");
            return Ok(TickOutcome::Idle);
        };
        let raw = match self.store.range(&SeriesKey::raw(&device), TimeRange::all()) {
            Ok(raw) => raw,
            Err(StoreError::MissingSeries(key)) => {
                warn!(device = %device, key = %key, "queued device has no raw series");
                return Ok(TickOutcome::Idle);
            }
            Err(e) => return Err(e.into()),
        };

        if self.model.is_none() {
            self.bootstrap(&device, &raw)?;
        }
        if ctx.deadline_passed() {
            return Ok(TickOutcome::Aborted);
        }

        self.ensure_forecast_series(&device)?;
        let cursor = self.cursor_for(&device, &raw)?;

        let values: Vec<f64> = raw.iter().map(|s| s.value).collect();
        let (Some(input), Some(timestamp_ms)) = (
            self.config.window.input_at(&values, cursor),
            forecast_timestamp(&raw, self.config.window.length(), cursor, self.config.step_ms()),
        ) else {
            debug!(device = %device, cursor, points = raw.len(), "nothing to forecast");
            return Ok(TickOutcome::Idle);
        };

        let Some(model) = self.model.as_ref() else {
            return Ok(TickOutcome::Idle);
        };
        let prediction = ForecastJob::new(device.clone(), input.to_vec(), model).run()?;

        if ctx.deadline_passed() {
            return Ok(TickOutcome::Aborted);
        }

        let key = SeriesKey::forecast(&device);
        let accepted = self
            .store
            .append(&key, &[Sample::new(timestamp_ms, prediction.value)])?;
        if accepted == 0 {
            debug!(key = %key, timestamp_ms, "forecast timestamp already present");
        }
        info!(
            device = %device,
            cursor,
            timestamp_ms,
            value = prediction.value,
            model = %prediction.model,
            "appended forecast"
        );

        self.cursors.insert(device, cursor + 1);
        Ok(TickOutcome::Progressed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::store::InMemoryTimeSeriesStore;
    use meterflow_ai::{Persistence, StaticModelSource};

    const STEP: i64 = 900_000;

    fn config(window: usize) -> ForecastConfig {
        ForecastConfig {
            queue: "device_queue".to_string(),
            window: Window::new(window).unwrap(),
            step: Duration::from_millis(STEP as u64),
        }
    }

    fn seeded(device: &str, n: usize) -> (Arc<InMemoryTimeSeriesStore>, DeviceId) {
        let store = Arc::new(InMemoryTimeSeriesStore::new());
        let dev = DeviceId::parse(device).unwrap();
        let key = SeriesKey::raw(&dev);
        store.create_series(&key, &Labels::device(&dev)).unwrap();
        let samples: Vec<Sample> = (0..n).map(|i| Sample::new(i as i64 * STEP, i as f64)).collect();
        store.append(&key, &samples).unwrap();
        store.push_queue("device_queue", &dev.queue_member()).unwrap();
        (store, dev)
    }

    fn ctx() -> TickContext {
        TickContext::with_timeout(1, Duration::from_secs(60))
    }

    fn forecaster(
        store: Arc<InMemoryTimeSeriesStore>,
        window: usize,
    ) -> Forecaster<Arc<InMemoryTimeSeriesStore>, StaticModelSource<Persistence>> {
        Forecaster::new(store, StaticModelSource::new(Persistence::new(window)), config(window))
    }

    #[test]
    fn empty_queue_is_idle_and_does_not_bootstrap() {
        let store = Arc::new(InMemoryTimeSeriesStore::new());
        let mut f = forecaster(store, 4);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);
        assert!(!f.is_bootstrapped());
    }

    #[test]
    fn forecasts_walk_the_series_and_stop_when_caught_up() {
        let (store, dev) = seeded("devA", 6);
        let mut f = forecaster(store.clone(), 4);

        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);
        assert_eq!(f.cursor(&dev), Some(7));

        let got = store.range(&SeriesKey::forecast(&dev), TimeRange::all()).unwrap();
        // Persistence repeats the last input value.
        assert_eq!(
            got,
            vec![
                Sample::new(4 * STEP, 3.0),
                Sample::new(5 * STEP, 4.0),
                Sample::new(6 * STEP, 5.0),
            ]
        );
    }

    #[test]
    fn new_raw_points_resume_a_caught_up_device() {
        let (store, dev) = seeded("devA", 4);
        let mut f = forecaster(store.clone(), 4);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);

        store
            .append(&SeriesKey::raw(&dev), &[Sample::new(4 * STEP, 40.0)])
            .unwrap();
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        let got = store.range(&SeriesKey::forecast(&dev), TimeRange::all()).unwrap();
        assert_eq!(got.last(), Some(&Sample::new(5 * STEP, 40.0)));
    }

    #[test]
    fn short_series_is_idle() {
        let (store, dev) = seeded("devA", 2);
        let mut f = forecaster(store.clone(), 4);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);
        assert!(f.is_bootstrapped());
        assert!(store.range(&SeriesKey::forecast(&dev), TimeRange::all()).unwrap().is_empty());
    }

    #[test]
    fn restart_continues_existing_forecasts() {
        let (store, dev) = seeded("devA", 8);
        let mut first = forecaster(store.clone(), 4);
        first.tick(&ctx()).unwrap();
        first.tick(&ctx()).unwrap();

        let mut second = forecaster(store.clone(), 4);
        assert_eq!(second.tick(&ctx()).unwrap(), TickOutcome::Progressed);
        assert_eq!(second.cursor(&dev), Some(7));
        let stamps: Vec<i64> = store
            .range(&SeriesKey::forecast(&dev), TimeRange::all())
            .unwrap()
            .iter()
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![4 * STEP, 5 * STEP, 6 * STEP]);
    }

    #[test]
    fn hourly_raw_data_still_yields_step_spaced_forecasts() {
        let store = Arc::new(InMemoryTimeSeriesStore::new());
        let dev = DeviceId::parse("devA").unwrap();
        let key = SeriesKey::raw(&dev);
        store.create_series(&key, &Labels::device(&dev)).unwrap();
        let hour = 4 * STEP;
        let samples: Vec<Sample> = (0..8).map(|i| Sample::new(i * hour, i as f64)).collect();
        store.append(&key, &samples).unwrap();
        store.push_queue("device_queue", &dev.queue_member()).unwrap();

        let mut f = forecaster(store.clone(), 4);
        f.tick(&ctx()).unwrap();
        f.tick(&ctx()).unwrap();

        let got = store.range(&SeriesKey::forecast(&dev), TimeRange::all()).unwrap();
        assert_eq!(
            got.iter().map(|s| s.timestamp_ms).collect::<Vec<_>>(),
            vec![3 * hour + STEP, 3 * hour + 2 * STEP]
        );

        // A restarted forecaster picks up from the step-spaced stamps.
        let mut again = forecaster(store.clone(), 4);
        again.tick(&ctx()).unwrap();
        assert_eq!(again.cursor(&dev), Some(7));
    }

    #[test]
    fn expired_deadline_aborts_without_writing() {
        let (store, dev) = seeded("devA", 6);
        let mut f = forecaster(store.clone(), 4);
        let expired = TickContext::new(1, Instant::now());
        assert_eq!(f.tick(&expired).unwrap(), TickOutcome::Aborted);
        assert!(store.range(&SeriesKey::forecast(&dev), TimeRange::all()).is_err());
        assert_eq!(f.cursor(&dev), None);
    }

    #[test]
    fn devices_are_visited_round_robin() {
        let (store, a) = seeded("devA", 5);
        let b = DeviceId::parse("devB").unwrap();
        store.create_series(&SeriesKey::raw(&b), &Labels::device(&b)).unwrap();
        let samples: Vec<Sample> = (0..5).map(|i| Sample::new(i * STEP, 100.0 + i as f64)).collect();
        store.append(&SeriesKey::raw(&b), &samples).unwrap();
        store.push_queue("device_queue", &b.queue_member()).unwrap();

        let mut f = forecaster(store.clone(), 4);
        f.tick(&ctx()).unwrap();
        f.tick(&ctx()).unwrap();
        assert_eq!(f.cursor(&a), Some(5));
        assert_eq!(f.cursor(&b), Some(5));
        assert_eq!(store.queue_members("device_queue").unwrap().len(), 2);
    }

    #[test]
    fn unusable_queue_members_are_skipped() {
        let store = Arc::new(InMemoryTimeSeriesStore::new());
        store.push_queue("device_queue", "ts:").unwrap();
        store.push_queue("device_queue", "ts:ghost").unwrap();
        let mut f = forecaster(store, 4);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);
        assert_eq!(f.tick(&ctx()).unwrap(), TickOutcome::Idle);
        assert!(!f.is_bootstrapped());
    }

    #[test]
    fn connect_probes_the_store() {
        let store = Arc::new(InMemoryTimeSeriesStore::new());
        let f = Forecaster::connect(store, StaticModelSource::new(Persistence::new(4)), config(4)).unwrap();
        assert!(!f.is_bootstrapped());
    }
}
