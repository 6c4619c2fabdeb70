//! Liveness pings while connected.
//!
//! The monitor does not own a timer task. It accumulates the real elapsed
//! time handed to [`Heartbeat::advance`] on each tick and reports when a
//! `KEEP` is due, so at most one heartbeat can ever be active.

use std::time::Duration;

/// Default interval between `KEEP` datagrams.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Periodic `KEEP` scheduler.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    elapsed: Duration,
    active: bool,
    sent: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Heartbeat {
    /// Create a stopped heartbeat with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            active: false,
            sent: 0,
        }
    }

    /// Start counting from zero. Restarting an active heartbeat is a no-op.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.elapsed = Duration::ZERO;
        tracing::debug!("Heartbeat started ({:?} interval)", self.interval);
    }

    /// Stop immediately.
    pub fn stop(&mut self) {
        if self.active {
            self.active = false;
            tracing::debug!("Heartbeat stopped");
        }
    }

    /// Whether the heartbeat is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of pings reported due since creation.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Add `dt` of real time. Returns `true` when a `KEEP` is due.
    ///
    /// A long stall produces a single ping, not one per missed interval.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if !self.active {
            return false;
        }
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed = Duration::ZERO;
        self.sent += 1;
        true
    }
}
