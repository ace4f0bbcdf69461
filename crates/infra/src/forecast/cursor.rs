//! Per-device cursor arithmetic.
//!
//! A cursor `c` means "the input window ends just before raw index `c`".
//! Valid cursors satisfy `window <= c <= len`; `c == len + 1` means the
//! device is caught up until more raw data arrives.
//!
//! Forecast timestamps are anchored at the end of the first window,
//! `ts[window - 1]`, and advance by exactly one step per cursor, so
//! consecutive forecasts are one step apart whatever the raw spacing.

use meterflow_core::Sample;

/// Timestamp of the forecast produced at `cursor`:
/// `ts[window - 1] + (cursor - window + 1) * step`.
pub fn forecast_timestamp(raw: &[Sample], window: usize, cursor: usize, step_ms: i64) -> Option<i64> {
    if cursor < window || cursor > raw.len() {
        return None;
    }
    let anchor = raw.get(window.checked_sub(1)?)?.timestamp_ms;
    let steps = i64::try_from(cursor - window + 1).ok()?;
    anchor.checked_add(step_ms.checked_mul(steps)?)
}

/// First cursor whose forecast is not yet in the store.
///
/// `last_forecast` is the newest timestamp already in the forecast series.
/// Earlier positions are skipped so a restarted forecaster continues the
/// series instead of re-predicting history.
pub fn resume_cursor(window: usize, raw: &[Sample], last_forecast: Option<i64>, step_ms: i64) -> usize {
    let anchor = window.checked_sub(1).and_then(|i| raw.get(i));
    let (Some(last), Some(anchor)) = (last_forecast, anchor) else {
        return window;
    };
    if step_ms <= 0 {
        return window;
    }
    // Forecasts 1..=done occupy cursors window..window + done.
    let done = last.saturating_sub(anchor.timestamp_ms) / step_ms;
    match usize::try_from(done) {
        Ok(done) => window.saturating_add(done),
        Err(_) => window,
    }
}
