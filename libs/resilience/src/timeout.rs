//! Deadline wrappers around async operations.

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::TimeoutError;

/// Runs `operation` with a deadline. The elapsed variant reports the
/// deadline that was missed.
pub async fn with_timeout<F, T>(deadline: Duration, operation: F) -> Result<T, TimeoutError<std::convert::Infallible>>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(value) => Ok(value),
        Err(_) => Err(TimeoutError::Elapsed(deadline)),
    }
}

/// Like [`with_timeout`] for fallible operations; the operation's own error
/// comes back as [`TimeoutError::Inner`].
pub async fn with_timeout_result<F, T, E>(
    deadline: Duration,
    operation: F,
) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(deadline)),
    }
}

/// Clamps a caller-requested deadline to the configured ceiling, falling
/// back to the default when none is given.
pub fn effective_deadline(config: &TimeoutConfig, requested: Option<Duration>) -> Duration {
    match requested {
        Some(d) => d.min(config.max),
        None => config.default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fast_operation_completes() {
        let out = with_timeout(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn slow_operation_reports_elapsed_deadline() {
        let out = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        match out {
            Err(TimeoutError::Elapsed(d)) => assert_eq!(d, Duration::from_millis(50)),
            other => panic!("expected Elapsed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_error_is_preserved() {
        let out: Result<(), _> =
            with_timeout_result(Duration::from_secs(1), async { Err::<(), _>("boom") }).await;
        assert!(matches!(out, Err(TimeoutError::Inner("boom"))));
    }

    #[test]
    fn requested_deadline_is_clamped_to_max() {
        let config = TimeoutConfig::default();
        assert_eq!(
            effective_deadline(&config, Some(Duration::from_secs(600))),
            config.max
        );
        assert_eq!(
            effective_deadline(&config, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(effective_deadline(&config, None), config.default);
    }
}
