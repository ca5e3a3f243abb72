//! Per-component retry policy.

use std::time::Duration;

use cascade_core::ErrorKind;
use serde::{Deserialize, Serialize};

/// Retry behaviour attached to a component definition.
///
/// Delays follow `min(initial * coeff^(n-1), max)` for attempt `n`
/// (1-indexed). Errors whose kind appears in
/// `non_retryable_error_kinds` skip further attempts regardless of the
/// attempt budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, in seconds.
    pub initial_interval_seconds: f64,
    /// Multiplier applied per subsequent attempt.
    pub backoff_coefficient: f64,
    /// Upper bound on any single delay, in seconds.
    pub maximum_interval_seconds: f64,
    /// Error kinds that are never retried for this component.
    #[serde(default)]
    pub non_retryable_error_kinds: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_seconds: 1.0,
            backoff_coefficient: 2.0,
            maximum_interval_seconds: 60.0,
            non_retryable_error_kinds: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to apply before attempt `n` (1-indexed; attempt 1 has no delay).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).saturating_sub(1);
        let raw = self.initial_interval_seconds * self.backoff_coefficient.powi(exponent as i32);
        Duration::from_secs_f64(raw.min(self.maximum_interval_seconds).max(0.0))
    }

    /// Whether a failed attempt of the given kind may be retried.
    #[must_use]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        attempt < self.max_attempts
            && kind.is_retryable()
            && !self.non_retryable_error_kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_follow_exponential_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_interval_seconds: 1.0,
            backoff_coefficient: 2.0,
            maximum_interval_seconds: 60.0,
            non_retryable_error_kinds: Vec::new(),
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
    }

    #[test]
    fn delays_are_capped_at_maximum() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_interval_seconds: 10.0,
            backoff_coefficient: 10.0,
            maximum_interval_seconds: 30.0,
            non_retryable_error_kinds: Vec::new(),
        };
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(30));
    }

    #[test]
    fn retry_respects_attempt_budget() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(ErrorKind::Dependency, 1));
        assert!(!policy.should_retry(ErrorKind::Dependency, 2));
    }

    #[test]
    fn retry_skips_non_retryable_kinds() {
        let policy = RetryPolicy {
            non_retryable_error_kinds: vec![ErrorKind::Timeout],
            ..RetryPolicy::default()
        };
        assert!(!policy.should_retry(ErrorKind::Timeout, 1));
        assert!(policy.should_retry(ErrorKind::Dependency, 1));
    }

    #[test]
    fn validation_errors_never_retry() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(ErrorKind::Validation, 1));
        assert!(!policy.should_retry(ErrorKind::Cancelled, 1));
    }

    #[test]
    fn none_policy_exhausts_immediately() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(ErrorKind::Dependency, 1));
    }

    #[test]
    fn serde_camel_case_wire_shape() {
        let policy = RetryPolicy::default();
        let json = serde_json::to_value(&policy).unwrap();
        assert!(json.get("maxAttempts").is_some());
        assert!(json.get("initialIntervalSeconds").is_some());
        assert!(json.get("backoffCoefficient").is_some());
    }
}
