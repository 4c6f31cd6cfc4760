//! Bounded exponential backoff for the activity boundary.
//!
//! Each call the orchestrator makes through [`crate::activities::BulkActivities`]
//! is independently retried under this policy. Only failures whose
//! [`ErrorKind`](crate::error::ErrorKind) is classified retryable are
//! attempted again; a `NotFound` or `Processing` failure propagates on the
//! first attempt.

use crate::error::BulkResult;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Retry an operation with exponential backoff, doubling the delay after
/// every failed attempt up to `max_delay`.
///
/// # Errors
///
/// Returns the last error once the failure is non-retryable or
/// `max_attempts` is exhausted.
pub fn retry_with_backoff<F, T>(config: &RetryConfig, mut operation: F) -> BulkResult<T>
where
    F: FnMut() -> BulkResult<T>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_attempts {
                    return Err(err);
                }
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2).min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BulkError, ErrorKind};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn retries_transient_until_success() {
        let mut attempts = 0;
        let result = retry_with_backoff(&fast_config(), || {
            attempts += 1;
            if attempts < 3 {
                Err(BulkError::new(ErrorKind::TransientIo, "flaky"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn non_retryable_fails_first_attempt() {
        let mut attempts = 0;
        let result: BulkResult<()> = retry_with_backoff(&fast_config(), || {
            attempts += 1;
            Err(BulkError::new(ErrorKind::NotFound, "missing"))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut attempts = 0;
        let result: BulkResult<()> = retry_with_backoff(&fast_config(), || {
            attempts += 1;
            Err(BulkError::new(ErrorKind::TransientIo, "still flaky"))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }
}
