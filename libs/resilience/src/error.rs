//! Error types for the resilience patterns.
//!
//! Admission rejections (circuit open, rate limited, bulkhead full) are
//! distinguishable by variant so callers can apply different fallbacks.
//! Underlying operation errors are carried by value, never swallowed;
//! cancellation is reported as its own kind and never reclassified.

use std::time::Duration;

/// A configuration field failed validation. Raised at construction time only.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid config: {field} {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Outcome of a circuit-breaker guarded call.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit rejected the call without invoking the operation.
    #[error("circuit breaker '{service}' is open")]
    Open { service: String },
    /// The operation ran and failed; the breaker recorded the failure.
    #[error("call failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }
}

/// Outcome of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the final attempt's error.
    #[error("all {attempts} attempts exhausted: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    /// The composed circuit breaker rejected an attempt.
    #[error("circuit breaker '{service}' is open")]
    CircuitOpen { service: String },
    /// The caller's cancellation signal fired during an inter-attempt wait.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Rejection from a bulkhead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BulkheadError {
    /// Active slots and the wait queue were both full.
    #[error("bulkhead '{name}' is full (max_concurrent: {max_concurrent}, max_queue: {max_queue})")]
    Full {
        name: String,
        max_concurrent: u32,
        max_queue: u32,
    },
    /// A slot did not free up within the queue timeout.
    #[error("bulkhead '{name}' queue wait timed out after {waited:?}")]
    QueueTimeout { name: String, waited: Duration },
}

/// Outcome of a deadline-bounded operation.
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("call failed: {0}")]
    Inner(E),
}

/// Failed to decode persisted circuit state or a wire event.
#[derive(Debug, thiserror::Error)]
#[error("serialization error: {0}")]
pub struct CodecError(#[from] pub serde_json::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_kinds_are_distinguishable() {
        let open: CircuitBreakerError<&str> = CircuitBreakerError::Open {
            service: "payments".to_string(),
        };
        assert!(open.is_open());

        let inner: CircuitBreakerError<&str> = CircuitBreakerError::Inner("boom");
        assert!(!inner.is_open());

        let full = BulkheadError::Full {
            name: "db".to_string(),
            max_concurrent: 2,
            max_queue: 1,
        };
        let timed_out = BulkheadError::QueueTimeout {
            name: "db".to_string(),
            waited: Duration::from_millis(50),
        };
        assert!(matches!(full, BulkheadError::Full { .. }));
        assert!(matches!(timed_out, BulkheadError::QueueTimeout { .. }));
    }

    #[test]
    fn exhaustion_reports_attempts_and_cause() {
        let err: RetryError<&str> = RetryError::Exhausted {
            attempts: 3,
            last_error: "connection refused",
        };
        assert!(err.is_exhausted());
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn cancellation_is_not_exhaustion() {
        let err: RetryError<&str> = RetryError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_exhausted());
    }
}
