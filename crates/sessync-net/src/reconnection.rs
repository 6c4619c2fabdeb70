//! Retrying the join handshake after a timeout.
//!
//! [`ReconnectState`] computes exponentially increasing delays with jitter and
//! counts them down from the owner's tick, the same way the handshake timeout
//! and heartbeat are driven. It never opens anything itself; the owner calls
//! `connect` again when [`ReconnectState::advance`] reports the delay elapsed.

use std::time::Duration;

use rand::Rng;

/// Configuration for retrying a timed-out connect.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Maximum delay between attempts. Default: 30 s.
    pub max_delay: Duration,
    /// Attempts before giving up. Default: 10.
    pub max_attempts: u32,
    /// Jitter factor (0.0–1.0), applied as ±jitter to the delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.25,
        }
    }
}

/// Tracks the attempt count and the pending retry delay.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
    /// Time left until the armed retry is due.
    pending: Option<Duration>,
}

impl ReconnectState {
    /// Create a new state from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
            pending: None,
        }
    }

    /// Compute the next delay and advance the attempt counter.
    /// Returns `None` if max attempts have been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }

        let base = self.current_delay;
        self.attempts += 1;

        let jittered = if self.config.jitter > 0.0 {
            let mut rng = rand::rng();
            let factor = rng.random_range((1.0 - self.config.jitter)..=(1.0 + self.config.jitter));
            base.mul_f64(factor)
        } else {
            base
        };

        let next = self.current_delay.mul_f64(self.config.backoff_multiplier);
        self.current_delay = next.min(self.config.max_delay);

        Some(jittered.min(self.config.max_delay))
    }

    /// Schedule the next retry. Returns the delay, or `None` when exhausted.
    pub fn arm(&mut self) -> Option<Duration> {
        let delay = self.next_delay()?;
        tracing::info!("Retrying connect (attempt {}) in {delay:?}", self.attempts);
        self.pending = Some(delay);
        Some(delay)
    }

    /// Count `dt` off the armed retry. Returns `true` once when it is due.
    pub fn advance(&mut self, dt: Duration) -> bool {
        let Some(remaining) = self.pending else {
            return false;
        };
        let remaining = remaining.saturating_sub(dt);
        if remaining.is_zero() {
            self.pending = None;
            true
        } else {
            self.pending = Some(remaining);
            false
        }
    }

    /// Whether a retry is scheduled.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget attempts and any scheduled retry (after a successful handshake).
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
        self.pending = None;
    }

    /// Return the number of attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
