use rand::Rng;
use std::time::Duration;

/// How a response status classifies for retry purposes (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// `< 400`: the call succeeded.
    Success,
    /// `>= 400`, not `429` and not `>= 500`: fail immediately.
    NonRetryable,
    /// `429` or `>= 500`: worth retrying, subject to the attempt budget.
    Retryable,
}

/// Classifies an HTTP status per the retry policy of §4.4.
pub fn classify_status(status: u16) -> RetryDecision {
    if status < 400 {
        RetryDecision::Success
    } else if status == 429 || status >= 500 {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

/// Computes the sleep duration before the next attempt.
///
/// `attempts` is the number of attempts made so far (1-indexed: the first
/// failed attempt passes `1`). Uses `min(8, 2^(attempts-1)) + jitter` unless
/// `retry_after` supplies a valid numeric override from a `Retry-After`
/// header.
pub fn backoff_delay(attempts: u32, retry_after: Option<f64>) -> Duration {
    if let Some(secs) = retry_after {
        if secs.is_finite() && secs >= 0.0 {
            return Duration::from_secs_f64(secs);
        }
    }
    let exp = 2f64.powi((attempts.saturating_sub(1)) as i32);
    let base = exp.min(8.0);
    let jitter = rand::thread_rng().gen_range(0.0..0.5);
    Duration::from_secs_f64(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success_below_400() {
        assert_eq!(classify_status(200), RetryDecision::Success);
        assert_eq!(classify_status(399), RetryDecision::Success);
    }

    #[test]
    fn classifies_429_and_5xx_as_retryable() {
        assert_eq!(classify_status(429), RetryDecision::Retryable);
        assert_eq!(classify_status(500), RetryDecision::Retryable);
        assert_eq!(classify_status(503), RetryDecision::Retryable);
    }

    #[test]
    fn classifies_other_4xx_as_non_retryable() {
        assert_eq!(classify_status(400), RetryDecision::NonRetryable);
        assert_eq!(classify_status(404), RetryDecision::NonRetryable);
        assert_eq!(classify_status(422), RetryDecision::NonRetryable);
    }

    #[test]
    fn backoff_never_exceeds_8_5_seconds() {
        for attempts in 1..20 {
            let delay = backoff_delay(attempts, None);
            assert!(delay.as_secs_f64() <= 8.5, "attempt {attempts} -> {delay:?}");
        }
    }

    #[test]
    fn backoff_is_monotone_non_decreasing_in_base() {
        let mut prev_base = 0.0;
        for attempts in 1..10 {
            let base = 2f64.powi((attempts - 1) as i32).min(8.0);
            assert!(base >= prev_base);
            prev_base = base;
        }
    }

    #[test]
    fn retry_after_header_overrides_exponential_backoff() {
        let delay = backoff_delay(5, Some(1.5));
        assert_eq!(delay, Duration::from_secs_f64(1.5));
    }

    #[test]
    fn negative_retry_after_is_ignored() {
        let delay = backoff_delay(1, Some(-1.0));
        assert!(delay.as_secs_f64() < 1.5);
    }
}
