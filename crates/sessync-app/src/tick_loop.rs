//! Fixed-rate tick loop for the client's owning thread.
//!
//! Each tick measures the real time elapsed since the previous one, hands it
//! to the tick function, then sleeps out the rest of the period. Timers
//! downstream accumulate the measured time, so a slow tick delays them but
//! never loses time.

use std::time::{Duration, Instant};
use tracing::warn;

/// A tick slower than this is reported.
pub const SLOW_TICK: Duration = Duration::from_millis(250);

/// Fixed-rate loop state.
pub struct TickLoop {
    period: Duration,
    previous_time: Instant,
    total_time: Duration,
    tick_count: u64,
}

impl TickLoop {
    /// Create a loop running at `rate_hz` ticks per second (at least one).
    pub fn new(rate_hz: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / rate_hz.max(1),
            previous_time: Instant::now(),
            total_time: Duration::ZERO,
            tick_count: 0,
        }
    }

    /// Run one tick: measure elapsed time, call `tick_fn(dt)`, then sleep
    /// until the period is over. Returns `dt`.
    pub fn tick(&mut self, tick_fn: impl FnOnce(Duration)) -> Duration {
        let start = Instant::now();
        let dt = start.duration_since(self.previous_time);
        self.previous_time = start;

        self.step(dt, tick_fn);

        if let Some(rest) = self.period.checked_sub(start.elapsed()) {
            std::thread::sleep(rest);
        }
        dt
    }

    /// Run one tick with an explicit elapsed time.
    fn step(&mut self, dt: Duration, tick_fn: impl FnOnce(Duration)) {
        if dt > SLOW_TICK {
            warn!(
                "Tick gap {:.1}ms exceeds {:.1}ms",
                dt.as_secs_f64() * 1000.0,
                SLOW_TICK.as_secs_f64() * 1000.0
            );
        }
        tick_fn(dt);
        self.total_time += dt;
        self.tick_count += 1;
    }

    /// Target time between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns the total number of ticks run.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns the total time handed to tick functions.
    pub fn total_time(&self) -> Duration {
        self.total_time
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(60)
    }
}
