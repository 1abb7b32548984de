//! Exponential read backoff

use std::time::Duration;

use rand::Rng;

/// Capped exponential backoff with optional jitter.
///
/// The n-th consecutive failure waits `base * 2^(n-1)`, never more than `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    /// Fraction of the delay to randomise (0.0 - 1.0)
    jitter: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Backoff {
            base,
            max: max.max(base),
            jitter: 0.0,
            failures: 0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exp = 2_u32.saturating_pow(self.failures - 1);
        let delay = self.base.saturating_mul(exp).min(self.max);

        if self.jitter > 0.0 {
            let spread = delay.as_secs_f64() * self.jitter;
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            Duration::from_secs_f64((delay.as_secs_f64() + delta).max(0.0))
        } else {
            delay
        }
    }

    /// Back to the base delay after any success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
