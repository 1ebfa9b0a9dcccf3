use rand::Rng;
use std::time::Duration;

/// Upper bound (exclusive) of the multiplicative jitter.
pub const MAX_JITTER: f64 = 0.1;

/// Exponential retry backoff: `base * 2^(attempt-1) * (1 + jitter)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Same cap, smaller base. The configured base acts as a ceiling.
    pub fn with_base_at_most(&self, base: Duration) -> Self {
        Self {
            base: self.base.min(base),
            max: self.max,
        }
    }

    /// Delay after failed attempt number `attempt` (1-indexed), with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER);
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic form of [`delay`](Self::delay); `jitter` is clamped to `[0, MAX_JITTER)`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, MAX_JITTER)
        } else {
            0.0
        };
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * 2f64.powi(exponent) * (1.0 + jitter);

        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
