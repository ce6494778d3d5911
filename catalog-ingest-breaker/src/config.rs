//! Per-dependency breaker configuration.
//!
//! Every protected dependency has a default configuration. Each field can be
//! overridden from the environment with `BREAKER_<NAME>_<FIELD>`, for example
//! `BREAKER_EMBEDDING_FAILURE_THRESHOLD=5`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Breaker name for the embedding service.
pub const EMBEDDING: &str = "embedding";
/// Breaker name for the search index.
pub const SEARCH_INDEX: &str = "search_index";
/// Breaker name for the message broker.
pub const BROKER: &str = "broker";
/// Breaker name for the cache.
pub const CACHE: &str = "cache";

/// Dependencies that have their own default configuration.
pub const KNOWN_DEPENDENCIES: [&str; 4] = [EMBEDDING, SEARCH_INDEX, BROKER, CACHE];

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Time an open breaker waits before letting probes through.
    pub recovery_timeout: Duration,
    /// Growth factor of the recovery timeout after each re-open.
    pub timeout_multiplier: f64,
    /// Upper bound of the escalated recovery timeout.
    pub max_timeout: Duration,
    /// Consecutive half-open successes that close the breaker. Also the
    /// number of probes allowed in flight at once.
    pub half_open_success_threshold: u32,
}

impl BreakerConfig {
    /// Configuration used for dependencies without a dedicated default.
    pub fn generic() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            timeout_multiplier: 2.0,
            max_timeout: Duration::from_secs(300),
            half_open_success_threshold: 2,
        }
    }

    /// Default configuration for a named dependency.
    ///
    /// Unrecognized names get [`BreakerConfig::generic`].
    pub fn for_dependency(name: &str) -> Self {
        match name {
            EMBEDDING => Self {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(20),
                max_timeout: Duration::from_secs(300),
                ..Self::generic()
            },
            SEARCH_INDEX => Self {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(15),
                max_timeout: Duration::from_secs(300),
                ..Self::generic()
            },
            BROKER => Self {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(30),
                max_timeout: Duration::from_secs(600),
                ..Self::generic()
            },
            CACHE => Self {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(10),
                max_timeout: Duration::from_secs(120),
                half_open_success_threshold: 1,
                ..Self::generic()
            },
            _ => Self::generic(),
        }
    }

    /// Default configuration for a named dependency with environment overrides applied.
    pub fn from_env(name: &str) -> Self {
        let defaults = Self::for_dependency(name);
        let prefix = format!("BREAKER_{}", name.to_ascii_uppercase());

        Self {
            failure_threshold: env_or(&prefix, "FAILURE_THRESHOLD", defaults.failure_threshold),
            recovery_timeout: Duration::from_secs(env_or(
                &prefix,
                "RECOVERY_TIMEOUT_SECS",
                defaults.recovery_timeout.as_secs(),
            )),
            timeout_multiplier: env_or(&prefix, "TIMEOUT_MULTIPLIER", defaults.timeout_multiplier),
            max_timeout: Duration::from_secs(env_or(
                &prefix,
                "MAX_TIMEOUT_SECS",
                defaults.max_timeout.as_secs(),
            )),
            half_open_success_threshold: env_or(
                &prefix,
                "HALF_OPEN_SUCCESSES",
                defaults.half_open_success_threshold,
            ),
        }
        .sanitized()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self.sanitized()
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self.sanitized()
    }

    pub fn with_half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = threshold;
        self.sanitized()
    }

    /// Recovery timeout after `reopen_count` half-open failures.
    ///
    /// `min(recovery_timeout * timeout_multiplier^reopen_count, max_timeout)`
    pub fn recovery_timeout_after(&self, reopen_count: u32) -> Duration {
        let exponent = i32::try_from(reopen_count).unwrap_or(i32::MAX);
        let secs = self.recovery_timeout.as_secs_f64() * self.timeout_multiplier.powi(exponent);
        let escalated = Duration::try_from_secs_f64(secs).unwrap_or(self.max_timeout);
        escalated.min(self.max_timeout)
    }

    /// Clamp values that would make the state machine meaningless.
    fn sanitized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.half_open_success_threshold = self.half_open_success_threshold.max(1);
        if !self.timeout_multiplier.is_finite() || self.timeout_multiplier < 1.0 {
            self.timeout_multiplier = 1.0;
        }
        if self.max_timeout < self.recovery_timeout {
            self.max_timeout = self.recovery_timeout;
        }
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::generic()
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(prefix: &str, field: &str, default: T) -> T {
    let key = format!("{}_{}", prefix, field);
    match env::var(&key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    variable = %key,
                    value = %raw,
                    default = %default,
                    "Invalid breaker override, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_defaults() {
        let embedding = BreakerConfig::for_dependency(EMBEDDING);
        assert_eq!(embedding.failure_threshold, 3);
        assert_eq!(embedding.recovery_timeout, Duration::from_secs(20));

        let index = BreakerConfig::for_dependency(SEARCH_INDEX);
        assert_eq!(index.failure_threshold, 3);
        assert_eq!(index.recovery_timeout, Duration::from_secs(15));

        let broker = BreakerConfig::for_dependency(BROKER);
        assert_eq!(broker.failure_threshold, 5);
        assert_eq!(broker.recovery_timeout, Duration::from_secs(30));
        assert_eq!(broker.max_timeout, Duration::from_secs(600));

        let cache = BreakerConfig::for_dependency(CACHE);
        assert_eq!(cache.half_open_success_threshold, 1);
    }

    #[test]
    fn test_unknown_dependency_gets_generic() {
        assert_eq!(
            BreakerConfig::for_dependency("payments"),
            BreakerConfig::generic()
        );
    }

    #[test]
    fn test_recovery_timeout_escalates_and_caps() {
        let config = BreakerConfig::for_dependency(EMBEDDING);

        assert_eq!(config.recovery_timeout_after(0), Duration::from_secs(20));
        assert_eq!(config.recovery_timeout_after(1), Duration::from_secs(40));
        assert_eq!(config.recovery_timeout_after(2), Duration::from_secs(80));
        assert_eq!(config.recovery_timeout_after(5), Duration::from_secs(300));
        assert_eq!(config.recovery_timeout_after(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_sanitized_clamps_thresholds() {
        let config = BreakerConfig::generic()
            .with_failure_threshold(0)
            .with_half_open_success_threshold(0);

        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.half_open_success_threshold, 1);
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("BREAKER_TESTDEP_FAILURE_THRESHOLD", "7");
        env::set_var("BREAKER_TESTDEP_RECOVERY_TIMEOUT_SECS", "not-a-number");

        let config = BreakerConfig::from_env("testdep");

        assert_eq!(config.failure_threshold, 7);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));

        env::remove_var("BREAKER_TESTDEP_FAILURE_THRESHOLD");
        env::remove_var("BREAKER_TESTDEP_RECOVERY_TIMEOUT_SECS");
    }
}
