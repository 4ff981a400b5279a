use coercion_domain::DomainError;
use std::time::Duration;

/// Retry policy expressed as a pure value rather than a dispatching strategy
/// object: initial interval, multiplier, randomization factor, max interval,
/// and max attempts, with Rust-idiomatic field names.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_interval_ms: 0, multiplier: 1.0, randomization_factor: 0.0, max_interval_ms: 0, max_attempts: 1 }
    }
}

impl RetryPolicy {
    pub fn exponential(initial_interval_ms: u64, multiplier: f64, max_interval_ms: u64, max_attempts: u32) -> Self {
        Self { initial_interval_ms, multiplier, randomization_factor: 0.2, max_interval_ms, max_attempts }
    }

    /// Validated per the registration rules: `initial > 0, multiplier > 1,
    /// randomization in [0,1], max >= initial`. A policy with `initial == 0`
    /// (the zero-retry default) is also accepted; it simply never retries.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.initial_interval_ms == 0 {
            return Ok(());
        }
        if self.multiplier <= 1.0 {
            return Err(DomainError::InvalidRetryPolicy(format!("multiplier must be > 1 (got {})", self.multiplier)));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(DomainError::InvalidRetryPolicy(format!(
                "randomization_factor must be in [0,1] (got {})",
                self.randomization_factor
            )));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(DomainError::InvalidRetryPolicy("max_interval must be >= initial_interval".into()));
        }
        Ok(())
    }

    /// Delay before the attempt numbered `attempt` (0-based, so `attempt=0`
    /// is the delay before the *second* try).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial_interval_ms == 0 {
            return Duration::ZERO;
        }
        let raw = self.initial_interval_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = if self.max_interval_ms > 0 { raw.min(self.max_interval_ms as f64) } else { raw };
        let jitter = if self.randomization_factor > 0.0 {
            let delta = capped * self.randomization_factor;
            rand::Rng::gen_range(&mut rand::thread_rng(), -delta..=delta)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initial_never_delays() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(5), Duration::ZERO);
    }

    #[test]
    fn exponential_grows_and_caps() {
        let p = RetryPolicy { randomization_factor: 0.0, ..RetryPolicy::exponential(100, 2.0, 1_000, 5) };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(10), Duration::from_millis(1_000));
    }

    #[test]
    fn rejects_non_increasing_multiplier() {
        let p = RetryPolicy::exponential(100, 1.0, 1_000, 5);
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_max_below_initial() {
        let p = RetryPolicy::exponential(1_000, 2.0, 100, 5);
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_randomization() {
        let mut p = RetryPolicy::exponential(100, 2.0, 1_000, 5);
        p.randomization_factor = 1.5;
        assert!(p.validate().is_err());
    }
}
