//! Process wiring for the two pipeline workers.
//!
//! The binaries stay thin: they load [`Config`], build the Redis store, and
//! call into the `run_*` functions here. The `*_with` variants take any store
//! so the wiring can be exercised against the in-memory backends.

use std::thread;

use anyhow::Context;
use tracing::{info, warn};

use meterflow_ai::{FileModelSource, ModelSource, Persistence, StaticModelSource, Trainer};
use meterflow_infra::blob::{BlobSource, FsBlobSource};
use meterflow_infra::config::{Config, ForecastSettings, ModelKind};
use meterflow_infra::forecast::Forecaster;
use meterflow_infra::ingest::{IngestConfig, IngestReport, Ingestor};
use meterflow_infra::schedule::{RunSummary, StopHandle, StopSignal, stop_pair};
use meterflow_infra::store::{RedisTimeSeriesStore, TimeSeriesStore};

/// One ingestion pass against Redis and the filesystem blob root.
pub fn run_ingest(config: &Config) -> anyhow::Result<IngestReport> {
    let store = RedisTimeSeriesStore::new(&config.redis).context("building redis client")?;
    store.probe().context("store probe failed")?;
    let blobs = FsBlobSource::new(&config.ingest.blob_root);
    run_ingest_with(store, blobs, config.ingest.ingest.clone())
}

pub fn run_ingest_with<S, B>(store: S, blobs: B, config: IngestConfig) -> anyhow::Result<IngestReport>
where
    S: TimeSeriesStore,
    B: BlobSource,
{
    let source = format!("{}/{}", config.bucket, config.object);
    Ingestor::new(store, blobs, config)
        .run()
        .with_context(|| format!("ingesting {source}"))
}

/// Run the forecaster against Redis until `stop` fires.
pub fn run_forecast(config: &Config, stop: &StopSignal) -> anyhow::Result<RunSummary> {
    let store = RedisTimeSeriesStore::new(&config.redis).context("building redis client")?;
    run_forecast_with(store, &config.forecast, stop)
}

/// Pick the model source from `settings.model` and drive the scheduler.
pub fn run_forecast_with<S>(store: S, settings: &ForecastSettings, stop: &StopSignal) -> anyhow::Result<RunSummary>
where
    S: TimeSeriesStore,
{
    match settings.model {
        ModelKind::Mlp => {
            let models = FileModelSource::new(&settings.model_file, Trainer::new(settings.trainer.clone()));
            drive(store, models, settings, stop)
        }
        ModelKind::Persistence => {
            let models = StaticModelSource::new(Persistence::new(settings.forecast.window.length()));
            drive(store, models, settings, stop)
        }
    }
}

fn drive<S, P>(store: S, models: P, settings: &ForecastSettings, stop: &StopSignal) -> anyhow::Result<RunSummary>
where
    S: TimeSeriesStore,
    P: ModelSource,
{
    let mut forecaster =
        Forecaster::connect(store, models, settings.forecast.clone()).context("store probe failed")?;
    info!(model = ?settings.model, window = settings.forecast.window.length(), "forecaster ready");
    settings
        .scheduler
        .run(&mut forecaster, stop)
        .context("forecast loop failed")
}

/// Stop signal wired to Ctrl-C.
///
/// The signal is awaited on a helper thread with its own single-threaded
/// runtime; the forecast loop itself stays synchronous.
pub fn ctrl_c_stop() -> anyhow::Result<StopSignal> {
    let (handle, signal) = stop_pair();
    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || wait_for_ctrl_c(handle))
        .context("spawning ctrl-c listener")?;
    Ok(signal)
}

fn wait_for_ctrl_c(handle: StopHandle) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!(error = %e, "cannot start signal runtime; ctrl-c will not stop gracefully");
            return;
        }
    };
    match runtime.block_on(tokio::signal::ctrl_c()) {
        Ok(()) => {
            info!("ctrl-c received; stopping after the current tick");
            handle.stop();
        }
        Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
}
