//! Preset policies for common downstream service types.

use std::time::Duration;

use chrono::Utc;

use crate::config::{
    BulkheadConfig, CircuitBreakerConfig, RateLimitAlgorithm, RateLimitConfig, RetryConfig,
    TimeoutConfig,
};
use crate::policy::Policy;

/// gRPC calls to internal microservices.
///
/// - Timeout: 30s (long enough for complex operations)
/// - Circuit breaker: 5 failures, 30s cooldown
/// - Retry: 3 attempts with exponential backoff
pub fn grpc_policy(service_name: impl Into<String>) -> Policy {
    Policy {
        service_name: service_name.into(),
        circuit_breaker: Some(CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }),
        retry: Some(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }),
        rate_limit: None,
        bulkhead: None,
        timeout: Some(TimeoutConfig {
            default: Duration::from_secs(30),
            max: Duration::from_secs(60),
        }),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Database queries (PostgreSQL, MySQL).
///
/// - Timeout: 10s (queries should be fast)
/// - Circuit breaker: 10 failures, 30s cooldown, more probes
/// - No retry (avoid duplicate writes)
/// - Bulkhead sized to a typical connection pool
pub fn database_policy(service_name: impl Into<String>) -> Policy {
    Policy {
        service_name: service_name.into(),
        circuit_breaker: Some(CircuitBreakerConfig {
            failure_threshold: 10,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 5,
        }),
        retry: None, // Don't retry DB writes
        rate_limit: None,
        bulkhead: Some(BulkheadConfig {
            max_concurrent: 20,
            max_queue: 50,
            queue_timeout: Duration::from_secs(2),
        }),
        timeout: Some(TimeoutConfig {
            default: Duration::from_secs(10),
            max: Duration::from_secs(30),
        }),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Redis and other cache backends.
///
/// - Timeout: 5s (cache should be fast)
/// - Circuit breaker: 3 failures, 15s cooldown
/// - Retry: 2 attempts (idempotent reads)
pub fn redis_policy(service_name: impl Into<String>) -> Policy {
    Policy {
        service_name: service_name.into(),
        circuit_breaker: Some(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(15),
            half_open_max_calls: 2,
        }),
        retry: Some(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.1,
        }),
        rate_limit: None,
        bulkhead: None,
        timeout: Some(TimeoutConfig {
            default: Duration::from_secs(5),
            max: Duration::from_secs(10),
        }),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Third-party HTTP APIs.
///
/// - Timeout: 15s (external latency varies)
/// - Circuit breaker: 5 failures, 60s cooldown (give them room to recover)
/// - Retry: 3 attempts with wide jitter
/// - Rate limit: token bucket, stay under partner quotas
pub fn http_external_policy(service_name: impl Into<String>) -> Policy {
    Policy {
        service_name: service_name.into(),
        circuit_breaker: Some(CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }),
        retry: Some(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.3,
        }),
        rate_limit: Some(RateLimitConfig {
            algorithm: RateLimitAlgorithm::TokenBucket,
            limit: 100,
            window: Duration::from_secs(60),
            burst_size: 20,
        }),
        bulkhead: None,
        timeout: Some(TimeoutConfig {
            default: Duration::from_secs(15),
            max: Duration::from_secs(30),
        }),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        for policy in [
            grpc_policy("svc"),
            database_policy("svc"),
            redis_policy("svc"),
            http_external_policy("svc"),
        ] {
            policy.validate().unwrap();
        }
    }

    #[test]
    fn database_preset_never_retries() {
        assert!(database_policy("orders-db").retry.is_none());
    }
}
