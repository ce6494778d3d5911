use std::time::Duration;

use rand::Rng;

use catalog_ingest_shared::DEFAULT_MAX_RETRIES;

/// Backoff before the first retry.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound of the backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Relative spread applied around the computed backoff.
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

/// How long a failed record waits before it is retried, and how often.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Backoff for an envelope with `retry_count`, without jitter.
    ///
    /// `min(base_backoff * 2^(retry_count - 1), max_backoff)`
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_backoff.as_secs_f64() * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// [`backoff_for`](Self::backoff_for) scaled by a random factor in
    /// `[1 - jitter_ratio, 1 + jitter_ratio]`.
    pub fn jittered_backoff<R: Rng>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let backoff = self.backoff_for(retry_count);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 {
            return backoff;
        }
        let factor = rng.gen_range((1.0 - ratio)..=(1.0 + ratio));
        Duration::try_from_secs_f64(backoff.as_secs_f64() * factor).unwrap_or(backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(20));
        assert_eq!(policy.backoff_for(7), Duration::from_secs(300));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(20),
            ..Default::default()
        };

        let backoffs: Vec<Duration> = (1..=10).map(|n| policy.backoff_for(n)).collect();

        assert!(backoffs.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(backoffs.last(), Some(&Duration::from_secs(20)));
    }

    #[test]
    fn test_jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::default();
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let backoff = policy.jittered_backoff(2, &mut rng);
            assert!(backoff >= Duration::from_millis(7_999));
            assert!(backoff <= Duration::from_millis(12_001));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = RetryPolicy {
            jitter_ratio: 0.0,
            ..Default::default()
        };

        assert_eq!(
            policy.jittered_backoff(1, &mut rand::thread_rng()),
            Duration::from_secs(5)
        );
    }
}
