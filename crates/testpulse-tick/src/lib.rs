//! Fixed-interval scheduler that drives analytics pushes.
//!
//! Each session owns one [`TickScheduler`]. The session's push loop waits
//! on [`TickScheduler::wait_for_tick`], computes a snapshot, and reports
//! how long that took with [`TickScheduler::record_tick_end`] so slow
//! snapshots show up in the logs.
//!
//! A zero interval disables the scheduler: `wait_for_tick` then pends
//! forever, which is harmless inside `tokio::select!`.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = cancel.cancelled() => break,
//!         _ = scheduler.wait_for_tick() => {
//!             push_snapshot().await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `Duration::ZERO` disables ticking.
    pub interval: Duration,
    /// Warn when the work after a tick takes more than this fraction of
    /// the interval. Clamped to `0.0..=1.0`.
    pub slow_threshold: f64,
    /// Upper bound of the random delay added to the first tick, so
    /// sessions opened together don't query the store in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            slow_threshold: 0.5,
            initial_jitter: Duration::from_millis(250),
        }
    }
}

impl TickConfig {
    /// Shortest non-zero interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Default settings with the given interval.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.slow_threshold = self.slow_threshold.clamp(0.0, 1.0);
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }
}

/// Fixed-interval scheduler. See the crate docs for the loop it sits in.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    work_start: Option<Instant>,
    paused: bool,
}

impl TickScheduler {
    /// Creates a scheduler whose first tick fires one interval (plus
    /// jitter) from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let next_tick = (!config.is_disabled()).then(|| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max))
            };
            TokioInstant::now() + config.interval + jitter
        });

        if config.is_disabled() {
            debug!("tick scheduler disabled");
        } else {
            debug!(
                interval_ms = config.interval.as_millis() as u64,
                "tick scheduler created"
            );
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            work_start: None,
            paused: false,
        }
    }

    /// Default settings with the given interval.
    pub fn every(interval: Duration) -> Self {
        Self::new(TickConfig::every(interval))
    }

    /// Waits for the next tick and returns its sequence number, starting
    /// at 1.
    ///
    /// Pends forever while paused or disabled. Cancel-safe: dropping the
    /// future before it resolves leaves the schedule untouched. A tick that
    /// fires a whole interval or more late drops the missed ticks; the next
    /// one is a full interval after it.
    pub async fn wait_for_tick(&mut self) -> u64 {
        let next = match self.next_tick {
            Some(next) if !self.paused => next,
            _ => std::future::pending().await,
        };
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.work_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let missed = late_by.as_nanos() / interval.as_nanos();
        if missed > 0 {
            warn!(
                tick = self.tick_count,
                missed = missed as u64,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + interval);

        trace!(tick = self.tick_count, "tick fired");
        self.tick_count
    }

    /// Marks the work for the current tick as done, warning when it took
    /// more than `slow_threshold` of the interval.
    ///
    /// Returns the work time, or `None` unless a tick has fired since the
    /// last call.
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.work_start.take()?;
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.config.interval.as_secs_f64();

        if utilization >= self.config.slow_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = self.config.interval.as_millis() as u64,
                "tick work is slow relative to the interval"
            );
        }
        Some(elapsed)
    }

    /// Stops ticks until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "tick scheduler paused");
        }
    }

    /// Restarts ticking; the next tick is one full interval from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if !self.config.is_disabled() {
                self.next_tick = Some(TokioInstant::now() + self.config.interval);
            }
            debug!(tick = self.tick_count, "tick scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
