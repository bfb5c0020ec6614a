use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponentially growing pauses between re-submissions of residual entries.
///
/// The n-th pause is `initial * factor^(n - 1)`, randomized by `jitter` and capped at `max`.
/// The iterator ends once `max_attempts` pauses have been handed out.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    max_attempts: Option<u16>,
    attempt: u16,
}

impl RetryBackoff {
    pub fn new(
        initial: Duration,
        max: Duration,
        factor: f64,
        jitter: f64,
        max_attempts: Option<u16>,
    ) -> Self {
        Self {
            initial,
            max,
            factor,
            jitter,
            max_attempts,
            attempt: 0,
        }
    }

    /// Number of pauses handed out so far.
    pub fn attempt(&self) -> u16 {
        self.attempt
    }

    /// Starts over, e.g. once a batch made progress.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay(&self, attempt: u16) -> Duration {
        // attempt is >= 1 here, powi(0) gives the initial interval
        let exponent = i32::from(attempt.saturating_sub(1));
        let base_ms = self.initial.as_millis() as f64 * self.factor.powi(exponent);

        let delay_ms = if self.jitter == 0.0 {
            base_ms
        } else {
            base_ms * rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter)
        };
        Duration::from_millis(delay_ms as u64).min(self.max)
    }
}

impl From<&RetryConfig> for RetryBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(u64::from(config.initial_retry_interval_in_ms)),
            Duration::from_millis(u64::from(config.max_retry_interval_in_ms)),
            config.retry_factor,
            config.retry_jitter,
            Some(config.max_retry_attempts),
        )
    }
}

impl Iterator for RetryBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(max_attempts) = self.max_attempts
            && self.attempt >= max_attempts
        {
            return None;
        }
        self.attempt += 1;
        Some(self.delay(self.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_exponentially_and_caps() {
        let backoff = RetryBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
            0.0,
            None,
        );
        let delays: Vec<u128> = backoff.take(5).map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_stops_after_max_attempts() {
        let mut backoff = RetryBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
            1.0,
            0.0,
            Some(3),
        );
        assert_eq!(backoff.by_ref().count(), 3);
        assert_eq!(backoff.attempt(), 3);
        assert!(backoff.next().is_none());

        backoff.reset();
        assert_eq!(backoff.next(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let backoff = RetryBackoff::new(
            Duration::from_millis(1000),
            Duration::from_secs(60),
            1.0,
            0.5,
            Some(50),
        );
        for delay in backoff {
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_from_retry_config() {
        let config = RetryConfig {
            max_retry_attempts: 2,
            initial_retry_interval_in_ms: 10,
            max_retry_interval_in_ms: 15,
            retry_factor: 2.0,
            retry_jitter: 0.0,
        };
        let delays: Vec<Duration> = RetryBackoff::from(&config).collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(15)]
        );
    }
}
