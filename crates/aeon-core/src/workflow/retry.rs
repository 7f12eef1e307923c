//! Retry decisions for failed step attempts.
//!
//! Stateless: all logic is in associated functions that take the step's
//! `RetryPolicy` as a parameter. A step is attempted at most
//! `1 + max_retries` times.

use std::time::Duration;

use aeon_types::workflow::RetryPolicy;

/// Stateless retry handler for workflow step failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Total attempts allowed by the policy, including the first.
    pub fn max_attempts(policy: &RetryPolicy) -> u32 {
        policy.max_retries.saturating_add(1)
    }

    /// Determine whether another attempt should follow a failed one.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < Self::max_attempts(policy)
    }

    /// How long to wait before the next attempt.
    pub fn delay(policy: &RetryPolicy) -> Duration {
        Duration::from_secs(policy.delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay_seconds: 2,
        }
    }

    #[test]
    fn test_should_retry_within_limit() {
        let p = policy(2);
        assert!(RetryHandler::should_retry(&p, 1));
        assert!(RetryHandler::should_retry(&p, 2));
    }

    #[test]
    fn test_should_not_retry_at_max() {
        assert!(!RetryHandler::should_retry(&policy(2), 3));
    }

    #[test]
    fn test_should_not_retry_beyond_max() {
        assert!(!RetryHandler::should_retry(&policy(2), 10));
    }

    #[test]
    fn test_zero_retries_single_attempt() {
        let p = RetryPolicy::none();
        assert_eq!(RetryHandler::max_attempts(&p), 1);
        assert!(!RetryHandler::should_retry(&p, 1));
    }

    #[test]
    fn test_default_policy_allows_four_attempts() {
        let p = RetryPolicy::default();
        assert_eq!(RetryHandler::max_attempts(&p), 4);
        assert_eq!(RetryHandler::delay(&p), Duration::from_secs(5));
    }

    #[test]
    fn test_max_attempts_saturates() {
        assert_eq!(RetryHandler::max_attempts(&policy(u32::MAX)), u32::MAX);
    }
}
