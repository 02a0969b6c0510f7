//! Retry policy: exponential backoff with cap and jitter

use rand::Rng;
use std::time::Duration;

/// Backoff configuration for the bootstrap retry loop.
///
/// Defaults: 5 attempts, 1s initial delay, 30s cap, doubling, ±10% jitter.
///
/// # Examples
///
/// ```
/// use cloudsql_bootstrap::bootstrap::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(8)
///     .with_initial_delay(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of connection attempts (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub multiplier: f64,
    /// Jitter fraction: each delay is scaled by a uniform factor in
    /// `[1 - jitter, 1 + jitter]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Set the attempt budget (clamped to at least 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on any single delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction (0 disables jitter)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Deterministic delay for the n-th retry (0-based), before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unscaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(unscaled.min(self.max_delay.as_secs_f64()))
    }

    /// Jittered delay for the n-th retry (0-based)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter == 0.0 {
            return base;
        }
        let factor = 1.0 + self.jitter * rand::thread_rng().gen_range(-1.0..1.0);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}
