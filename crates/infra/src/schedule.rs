//! Cooperative tick scheduler.
//!
//! A [`Tick`] is invoked repeatedly with a per-tick deadline. Between ticks
//! the scheduler sleeps on the stop channel, so [`StopHandle::stop`] wakes it
//! immediately instead of waiting out the interval.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// What a single tick achieved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Work was done; the regular interval applies.
    Progressed,
    /// Nothing to do (e.g. empty queue); the idle interval applies.
    Idle,
    /// The deadline passed mid-tick; partial work was discarded.
    Aborted,
}

/// Per-tick context handed to [`Tick::tick`].
#[derive(Debug, Clone)]
pub struct TickContext {
    tick: u64,
    deadline: Instant,
}

impl TickContext {
    pub fn new(tick: u64, deadline: Instant) -> Self {
        Self { tick, deadline }
    }

    /// Context whose deadline is `timeout` from now.
    pub fn with_timeout(tick: u64, timeout: Duration) -> Self {
        Self::new(tick, Instant::now() + timeout)
    }

    /// 1-based tick number.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A unit of periodic work.
pub trait Tick {
    type Error;

    fn tick(&mut self, ctx: &TickContext) -> Result<TickOutcome, Self::Error>;
}

/// Sender half of the stop signal.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    /// Ask the scheduler to stop after the current tick.
    pub fn stop(&self) {
        // Receiver gone means the run is already over.
        let _ = self.tx.send(());
    }
}

/// Receiver half of the stop signal, owned by the scheduler loop.
#[derive(Debug)]
pub struct StopSignal {
    rx: mpsc::Receiver<()>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()))
    }

    /// Sleep up to `dur`; returns `true` when stopped during the wait.
    ///
    /// All handles being dropped is not a stop request.
    pub fn wait(&self, dur: Duration) -> bool {
        match self.rx.recv_timeout(dur) {
            Ok(()) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(dur);
                false
            }
        }
    }
}

/// Create a connected stop handle/signal pair.
pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel();
    (StopHandle { tx }, StopSignal { rx })
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub progressed: u64,
    pub idle: u64,
    pub aborted: u64,
    /// `true` when the run ended via the stop signal.
    pub stopped: bool,
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    pub interval: Duration,
    pub idle_interval: Duration,
    pub tick_timeout: Duration,
    /// Bound on the number of ticks (`None` = run until stopped).
    pub max_ticks: Option<u64>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            idle_interval: Duration::from_secs(10),
            tick_timeout: Duration::from_secs(30),
            max_ticks: None,
        }
    }
}

impl TickScheduler {
    /// Drive `task` until stopped, `max_ticks` is reached, or a tick fails.
    pub fn run<T: Tick>(&self, task: &mut T, stop: &StopSignal) -> Result<RunSummary, T::Error> {
        let mut summary = RunSummary::default();
        info!(
            interval_ms = self.interval.as_millis() as u64,
            idle_ms = self.idle_interval.as_millis() as u64,
            "scheduler started"
        );

        loop {
            // Stop has priority.
            if stop.is_stopped() {
                summary.stopped = true;
                break;
            }
            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            summary.ticks += 1;
            let ctx = TickContext::with_timeout(summary.ticks, self.tick_timeout);
            let outcome = task.tick(&ctx)?;
            let pause = match outcome {
                TickOutcome::Progressed => {
                    summary.progressed += 1;
                    self.interval
                }
                TickOutcome::Idle => {
                    summary.idle += 1;
                    self.idle_interval
                }
                TickOutcome::Aborted => {
                    summary.aborted += 1;
                    warn!(tick = summary.ticks, "tick aborted at deadline");
                    self.idle_interval
                }
            };
            debug!(tick = summary.ticks, ?outcome, "tick finished");

            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            if stop.wait(pause) {
                summary.stopped = true;
                break;
            }
        }

        info!(
            ticks = summary.ticks,
            progressed = summary.progressed,
            idle = summary.idle,
            aborted = summary.aborted,
            stopped = summary.stopped,
            "scheduler stopped"
        );
        Ok(summary)
    }
}
