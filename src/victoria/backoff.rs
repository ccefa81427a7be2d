use std::time::Duration;

/// Exponential backoff policy for sink retries.
///
/// - initial_delay: delay before the first retry
/// - multiplier: factor by which delay grows each attempt
/// - max_delay: cap for the computed delay
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub const fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self { initial_delay, multiplier, max_delay }
    }

    /// Doubling from `initial_delay`, capped at one minute
    pub const fn doubling(initial_delay: Duration) -> Self {
        Self::new(initial_delay, 2.0, Duration::from_secs(60))
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_progression_and_cap() {
        let p = BackoffPolicy::doubling(Duration::from_secs(5));

        let cases = vec![(0, 5), (1, 10), (2, 20), (3, 40), (4, 60), (30, 60)];
        for (attempt, expected_secs) in cases {
            assert_eq!(p.next_delay(attempt).as_secs(), expected_secs, "attempt {attempt}");
        }
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        let p = BackoffPolicy::doubling(Duration::ZERO);
        assert_eq!(p.next_delay(0), Duration::ZERO);
        assert_eq!(p.next_delay(8), Duration::ZERO);
    }
}
