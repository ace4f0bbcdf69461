//! Environment-driven configuration for both workers.
//!
//! Every variable has a default; a variable that is set but malformed is an
//! error rather than silently falling back.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use meterflow_ai::TrainerConfig;
use meterflow_core::Window;

use crate::forecast::ForecastConfig;
use crate::ingest::IngestConfig;
use crate::schedule::TickScheduler;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Root directory of the filesystem blob store.
    pub blob_root: PathBuf,
    pub ingest: IngestConfig,
}

/// Which model the forecaster runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModelKind {
    /// Trained regressor, persisted at `model_file`.
    Mlp,
    /// Repeat the last observed value; needs no training.
    Persistence,
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mlp" => Ok(Self::Mlp),
            "persistence" => Ok(Self::Persistence),
            other => Err(format!("unknown model {other:?}, expected mlp or persistence")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForecastSettings {
    pub forecast: ForecastConfig,
    pub scheduler: TickScheduler,
    pub model: ModelKind,
    pub model_file: PathBuf,
    pub trainer: TrainerConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisSettings,
    pub ingest: IngestSettings,
    pub forecast: ForecastSettings,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = match env.string("REDIS_HOST") {
            Some(h) => h,
            None => {
                warn!("REDIS_HOST not set; using localhost");
                "localhost".to_string()
            }
        };
        let redis = RedisSettings {
            host,
            port: env.parse("REDIS_PORT", 6379)?,
            username: env.string("REDIS_USERNAME"),
            password: env.string("REDIS_PASSWORD"),
            timeout: env.secs("REDIS_TIMEOUT_SECS", 5)?,
        };

        let queue = env.string("DEVICE_QUEUE").unwrap_or_else(|| "device_queue".to_string());

        let ingest = IngestSettings {
            blob_root: env.string("BLOB_ROOT").unwrap_or_else(|| "./data".to_string()).into(),
            ingest: IngestConfig {
                bucket: env.string("SOURCE_BUCKET").unwrap_or_else(|| "meter-data".to_string()),
                object: env.string("SOURCE_OBJECT").unwrap_or_else(|| "devices.csv".to_string()),
                max_columns: env.parse_with("INGEST_MAX_COLUMNS", 11, |n: &usize| {
                    (*n >= 2).then_some(()).ok_or("must be at least 2")
                })?,
                delimiter: env.delimiter("INGEST_DELIMITER", b';')?,
                queue: queue.clone(),
            },
        };

        let window_len: usize = env.parse_with("FORECAST_WINDOW", 24, |n: &usize| {
            (*n >= 1).then_some(()).ok_or("must be at least 1")
        })?;
        let window = Window::new(window_len).map_err(|e| ConfigError::Invalid {
            var: "FORECAST_WINDOW",
            value: window_len.to_string(),
            reason: e.to_string(),
        })?;

        let defaults = TrainerConfig::default();
        let trainer = TrainerConfig {
            epochs: env.parse_with("TRAIN_EPOCHS", defaults.epochs, |n: &usize| {
                (*n >= 1).then_some(()).ok_or("must be at least 1")
            })?,
            batch_size: env.parse_with("TRAIN_BATCH_SIZE", defaults.batch_size, |n: &usize| {
                (*n >= 1).then_some(()).ok_or("must be at least 1")
            })?,
            learning_rate: env.parse_with("TRAIN_LEARNING_RATE", defaults.learning_rate, |lr: &f64| {
                (lr.is_finite() && *lr > 0.0).then_some(()).ok_or("must be a positive number")
            })?,
            hidden_units: env.parse_with("TRAIN_HIDDEN_UNITS", defaults.hidden_units, |n: &usize| {
                (*n >= 1).then_some(()).ok_or("must be at least 1")
            })?,
            seed: env.parse("TRAIN_SEED", defaults.seed)?,
            ..defaults
        };

        let forecast = ForecastSettings {
            forecast: ForecastConfig {
                queue,
                window,
                step: env.positive_secs("FORECAST_STEP_SECS", 900)?,
            },
            scheduler: TickScheduler {
                interval: env.secs("FORECAST_INTERVAL_SECS", 10)?,
                idle_interval: env.secs("FORECAST_IDLE_SECS", 10)?,
                tick_timeout: env.positive_secs("FORECAST_TICK_TIMEOUT_SECS", 30)?,
                max_ticks: None,
            },
            model: env.parse("FORECAST_MODEL", ModelKind::Mlp)?,
            model_file: env
                .string("MODEL_FILE")
                .unwrap_or_else(|| "forecast_model.json".to_string())
                .into(),
            trainer,
        };

        Ok(Self {
            redis,
            ingest,
            forecast,
        })
    }
}

/// Typed access over a lookup function.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank value, trimmed.
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse_with(var, default, |_| Ok::<(), &str>(()))
    }

    fn parse_with<T, C>(&self, var: &'static str, default: T, check: C) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
        C: Fn(&T) -> Result<(), &'static str>,
    {
        let Some(raw) = self.string(var) else {
            return Ok(default);
        };
        let invalid = |reason: String| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason,
        };
        let value = raw.parse::<T>().map_err(|e| invalid(e.to_string()))?;
        check(&value).map_err(|r| invalid(r.to_string()))?;
        Ok(value)
    }

    fn secs(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(var, default).map(Duration::from_secs)
    }

    fn positive_secs(&self, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse_with(var, default, |n: &u64| (*n > 0).then_some(()).ok_or("must be positive"))
            .map(Duration::from_secs)
    }

    fn delimiter(&self, var: &'static str, default: u8) -> Result<u8, ConfigError> {
        let Some(raw) = (self.0)(var).filter(|v| !v.is_empty()) else {
            return Ok(default);
        };
        match raw.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: "must be a single ASCII character".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let c = config(&[]).unwrap();
        assert_eq!(c.redis.host, "localhost");
        assert_eq!(c.redis.port, 6379);
        assert_eq!(c.redis.timeout, Duration::from_secs(5));
        assert_eq!(c.ingest.ingest, IngestConfig::default());
        assert_eq!(c.ingest.blob_root, PathBuf::from("./data"));
        assert_eq!(c.forecast.forecast.window.length(), 24);
        assert_eq!(c.forecast.forecast.step, Duration::from_secs(900));
        assert_eq!(c.forecast.forecast.queue, "device_queue");
        assert_eq!(c.forecast.scheduler.interval, Duration::from_secs(10));
        assert_eq!(c.forecast.model, ModelKind::Mlp);
        assert_eq!(c.forecast.trainer, TrainerConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let c = config(&[
            ("REDIS_HOST", "redis.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "s3cret"),
            ("DEVICE_QUEUE", "q"),
            ("INGEST_DELIMITER", ","),
            ("INGEST_MAX_COLUMNS", "5"),
            ("FORECAST_WINDOW", "4"),
            ("FORECAST_MODEL", "Persistence"),
            ("TRAIN_LEARNING_RATE", "0.01"),
        ])
        .unwrap();
        assert_eq!(c.redis.host, "redis.internal");
        assert_eq!(c.redis.port, 6380);
        assert_eq!(c.redis.password.as_deref(), Some("s3cret"));
        assert_eq!(c.redis.username, None);
        assert_eq!(c.ingest.ingest.delimiter, b',');
        assert_eq!(c.ingest.ingest.max_columns, 5);
        assert_eq!(c.ingest.ingest.queue, "q");
        assert_eq!(c.forecast.forecast.queue, "q");
        assert_eq!(c.forecast.forecast.window.length(), 4);
        assert_eq!(c.forecast.model, ModelKind::Persistence);
        assert_eq!(c.forecast.trainer.learning_rate, 0.01);
    }

    #[test]
    fn malformed_values_are_errors() {
        for (var, value) in [
            ("REDIS_PORT", "seventy"),
            ("FORECAST_WINDOW", "0"),
            ("FORECAST_STEP_SECS", "0"),
            ("INGEST_DELIMITER", ";;"),
            ("INGEST_MAX_COLUMNS", "1"),
            ("TRAIN_LEARNING_RATE", "-1"),
            ("TRAIN_EPOCHS", "0"),
            ("TRAIN_BATCH_SIZE", "0"),
            ("FORECAST_MODEL", "arima"),
        ] {
            match config(&[(var, value)]) {
                Err(ConfigError::Invalid { var: v, .. }) => assert_eq!(v, var),
                Ok(_) => panic!("{var}={value} should be rejected"),
            }
        }
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let c = config(&[("REDIS_PORT", "  "), ("MODEL_FILE", "")]).unwrap();
        assert_eq!(c.redis.port, 6379);
        assert_eq!(c.forecast.model_file, PathBuf::from("forecast_model.json"));
    }
}
