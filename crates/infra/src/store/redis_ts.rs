//! RedisTimeSeries-backed store.
//!
//! Command mapping:
//! - series: `TS.CREATE` / `TS.MADD` / `TS.RANGE` (RedisTimeSeries module)
//! - rotating queue: `LPUSH` / `RPOPLPUSH queue queue` / `LRANGE`
//! - probe: `SET` + `GET` of a dedicated key
//!
//! A connection is acquired per call with connect/read/write timeouts, so a
//! stalled server surfaces as [`StoreError::Connection`] instead of blocking
//! the caller forever.

use std::time::Duration;

use redis::IntoConnectionInfo;
use tracing::instrument;

use meterflow_core::{Labels, Sample, SeriesKey, TimeRange};

use super::r#trait::{StoreError, TimeSeriesStore};
use crate::config::RedisSettings;

const PROBE_KEY: &str = "meterflow:probe";
const PROBE_VALUE: &str = "ok";

/// Duplicate samples keep the first value written.
const DUPLICATE_POLICY: &str = "FIRST";

#[derive(Debug, Clone)]
pub struct RedisTimeSeriesStore {
    client: redis::Client,
    timeout: Duration,
}

impl RedisTimeSeriesStore {
    /// Build a client for `settings`. No connection is opened until the first call.
    pub fn new(settings: &RedisSettings) -> Result<Self, StoreError> {
        let mut info = (settings.host.as_str(), settings.port)
            .into_connection_info()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info.redis.username = settings.username.clone();
        info.redis.password = settings.password.clone();

        let client = redis::Client::open(info).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            timeout: settings.timeout,
        })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.set_write_timeout(Some(self.timeout))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(conn)
    }
}

fn map_err(command: &str, key: &str, e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped() {
        return StoreError::Connection(format!("{command} {key}: {e}"));
    }
    let msg = e.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("already exists") {
        StoreError::AlreadyExists(key.to_string())
    } else if lower.contains("does not exist") {
        StoreError::MissingSeries(key.to_string())
    } else {
        StoreError::Command(format!("{command} {key} failed: {msg}"))
    }
}

fn bound(b: Option<i64>, open: &str) -> String {
    b.map(|v| v.to_string()).unwrap_or_else(|| open.to_string())
}

impl TimeSeriesStore for RedisTimeSeriesStore {
    #[instrument(skip(self), err)]
    fn probe(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(PROBE_KEY)
            .arg(PROBE_VALUE)
            .query::<()>(&mut conn)
            .map_err(|e| map_err("SET", PROBE_KEY, e))?;
        let value: Option<String> = redis::cmd("GET")
            .arg(PROBE_KEY)
            .query(&mut conn)
            .map_err(|e| map_err("GET", PROBE_KEY, e))?;
        match value.as_deref() {
            Some(PROBE_VALUE) => Ok(()),
            other => Err(StoreError::Probe(format!("read back {other:?}"))),
        }
    }

    #[instrument(skip(self, labels), fields(key = %key), err)]
    fn create_series(&self, key: &SeriesKey, labels: &Labels) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("TS.CREATE");
        cmd.arg(key.as_str()).arg("DUPLICATE_POLICY").arg(DUPLICATE_POLICY);
        if !labels.is_empty() {
            cmd.arg("LABELS");
            for (name, value) in labels.iter() {
                cmd.arg(name).arg(value);
            }
        }
        cmd.query::<()>(&mut conn)
            .map_err(|e| map_err("TS.CREATE", key.as_str(), e))
    }

    #[instrument(skip(self, samples), fields(key = %key, samples = samples.len()), err)]
    fn append(&self, key: &SeriesKey, samples: &[Sample]) -> Result<usize, StoreError> {
        if samples.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("TS.MADD");
        for s in samples {
            cmd.arg(key.as_str()).arg(s.timestamp_ms).arg(s.value);
        }
        let replies: Vec<redis::Value> = cmd
            .query(&mut conn)
            .map_err(|e| map_err("TS.MADD", key.as_str(), e))?;
        Ok(replies
            .iter()
            .filter(|v| matches!(v, redis::Value::Int(_)))
            .count())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn range(&self, key: &SeriesKey, range: TimeRange) -> Result<Vec<Sample>, StoreError> {
        let mut conn = self.connection()?;
        let rows: Vec<(i64, String)> = redis::cmd("TS.RANGE")
            .arg(key.as_str())
            .arg(bound(range.from, "-"))
            .arg(bound(range.to, "+"))
            .query(&mut conn)
            .map_err(|e| map_err("TS.RANGE", key.as_str(), e))?;

        rows.into_iter()
            .map(|(ts, raw)| {
                raw.parse::<f64>()
                    .map(|v| Sample::new(ts, v))
                    .map_err(|e| StoreError::Reply(format!("TS.RANGE {key}: value {raw:?}: {e}")))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    fn push_queue(&self, queue: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(member)
            .query::<i64>(&mut conn)
            .map(|_| ())
            .map_err(|e| map_err("LPUSH", queue, e))
    }

    #[instrument(skip(self), err)]
    fn rotate_queue(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("RPOPLPUSH")
            .arg(queue)
            .arg(queue)
            .query(&mut conn)
            .map_err(|e| map_err("RPOPLPUSH", queue, e))
    }

    #[instrument(skip(self), err)]
    fn queue_members(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LRANGE")
            .arg(queue)
            .arg(0)
            .arg(-1)
            .query(&mut conn)
            .map_err(|e| map_err("LRANGE", queue, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RedisSettings {
        RedisSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: None,
            password: Some("secret".to_string()),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn client_construction_is_lazy() {
        assert!(RedisTimeSeriesStore::new(&settings()).is_ok());
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let store = RedisTimeSeriesStore::new(&settings()).unwrap();
        assert!(matches!(store.probe(), Err(StoreError::Connection(_))));
    }

    #[test]
    fn server_replies_map_to_typed_errors() {
        let exists = redis::RedisError::from((redis::ErrorKind::ResponseError, "TSDB: key already exists"));
        assert!(matches!(
            map_err("TS.CREATE", "ts:a_real", exists),
            StoreError::AlreadyExists(k) if k == "ts:a_real"
        ));

        let missing = redis::RedisError::from((redis::ErrorKind::ResponseError, "TSDB: the key does not exist"));
        assert!(matches!(
            map_err("TS.RANGE", "ts:a_real", missing),
            StoreError::MissingSeries(k) if k == "ts:a_real"
        ));

        let other = redis::RedisError::from((redis::ErrorKind::ResponseError, "TSDB: invalid timestamp"));
        assert!(matches!(map_err("TS.MADD", "ts:a_real", other), StoreError::Command(_)));
    }

    #[test]
    fn io_failures_map_to_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let e = redis::RedisError::from(io);
        assert!(matches!(map_err("LPUSH", "device_queue", e), StoreError::Connection(_)));
    }

    #[test]
    fn open_bounds_use_redis_markers() {
        assert_eq!(bound(None, "-"), "-");
        assert_eq!(bound(Some(42), "+"), "42");
    }
}
