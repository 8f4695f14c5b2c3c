//! Validated pattern configurations.
//!
//! Every config validates at construction and again inside
//! [`crate::policy::Policy::validate`]; out-of-range or cross-field
//! violations fail fast, never at call time. Durations serialize as explicit
//! `_ms` integer fields so the wire format is unambiguous across services.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Serde adapter: `Duration` as integer milliseconds.
pub mod duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::new(
            field,
            format!("must be in [{min}, {max}], got {value}"),
        ));
    }
    Ok(())
}

fn check_duration(
    field: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::new(
            field,
            format!("must be in [{min:?}, {max:?}], got {value:?}"),
        ));
    }
    Ok(())
}

/// Circuit breaker thresholds and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit (1-100).
    pub failure_threshold: u32,
    /// Successes in HalfOpen that close the circuit (1-10, <= failure_threshold).
    pub success_threshold: u32,
    /// Time the circuit stays Open before probing (1s-5m).
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Concurrent probe calls admitted while HalfOpen (1-10).
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
        half_open_max_calls: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            failure_threshold,
            success_threshold,
            timeout,
            half_open_max_calls,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("circuit_breaker.failure_threshold", self.failure_threshold, 1, 100)?;
        check_range("circuit_breaker.success_threshold", self.success_threshold, 1, 10)?;
        check_duration(
            "circuit_breaker.timeout",
            self.timeout,
            Duration::from_secs(1),
            Duration::from_secs(300),
        )?;
        check_range(
            "circuit_breaker.half_open_max_calls",
            self.half_open_max_calls,
            1,
            10,
        )?;
        if self.success_threshold > self.failure_threshold {
            return Err(ConfigError::new(
                "circuit_breaker.success_threshold",
                format!(
                    "cannot be greater than failure_threshold ({})",
                    self.failure_threshold
                ),
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

/// Exponential backoff retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total invocations, including the first (1-10).
    pub max_attempts: u32,
    /// Delay before the first retry (1ms-10s).
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound on any computed delay (1s-5m, >= base_delay).
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Exponential growth factor (1.0-10.0).
    pub multiplier: f64,
    /// Fraction of the delay used as the uniform jitter range (0.0-1.0).
    pub jitter: f64,
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier,
            jitter,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("retry.max_attempts", self.max_attempts, 1, 10)?;
        check_duration(
            "retry.base_delay",
            self.base_delay,
            Duration::from_millis(1),
            Duration::from_secs(10),
        )?;
        check_duration(
            "retry.max_delay",
            self.max_delay,
            Duration::from_secs(1),
            Duration::from_secs(300),
        )?;
        if !(1.0..=10.0).contains(&self.multiplier) {
            return Err(ConfigError::new(
                "retry.multiplier",
                format!("must be in [1.0, 10.0], got {}", self.multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::new(
                "retry.jitter",
                format!("must be in [0.0, 1.0], got {}", self.jitter),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::new(
                "retry.base_delay",
                format!(
                    "cannot be greater than max_delay ({:?})",
                    self.max_delay
                ),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Admission algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    TokenBucket,
    SlidingWindow,
}

/// Throughput budget for one identity class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithm,
    /// Admitted calls per window (1-100000).
    pub limit: u32,
    /// Trailing window the limit applies to (1s-1h).
    #[serde(rename = "window_ms", with = "duration_ms")]
    pub window: Duration,
    /// Token bucket capacity (1-10000, <= limit).
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn new(
        algorithm: RateLimitAlgorithm,
        limit: u32,
        window: Duration,
        burst_size: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            algorithm,
            limit,
            window,
            burst_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("rate_limit.limit", self.limit, 1, 100_000)?;
        check_duration(
            "rate_limit.window",
            self.window,
            Duration::from_secs(1),
            Duration::from_secs(3600),
        )?;
        check_range("rate_limit.burst_size", self.burst_size, 1, 10_000)?;
        if self.burst_size > self.limit {
            return Err(ConfigError::new(
                "rate_limit.burst_size",
                format!("cannot be greater than limit ({})", self.limit),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: RateLimitAlgorithm::TokenBucket,
            limit: 100,
            window: Duration::from_secs(60),
            burst_size: 10,
        }
    }
}

/// Concurrency isolation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Simultaneous in-flight operations (1-10000).
    pub max_concurrent: u32,
    /// Callers allowed to wait for a slot (0-10000).
    pub max_queue: u32,
    /// Longest a queued caller waits before rejection (1ms-30s).
    #[serde(rename = "queue_timeout_ms", with = "duration_ms")]
    pub queue_timeout: Duration,
}

impl BulkheadConfig {
    pub fn new(
        max_concurrent: u32,
        max_queue: u32,
        queue_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_concurrent,
            max_queue,
            queue_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("bulkhead.max_concurrent", self.max_concurrent, 1, 10_000)?;
        if self.max_queue > 10_000 {
            return Err(ConfigError::new(
                "bulkhead.max_queue",
                format!("must be in [0, 10000], got {}", self.max_queue),
            ));
        }
        check_duration(
            "bulkhead.queue_timeout",
            self.queue_timeout,
            Duration::from_millis(1),
            Duration::from_secs(30),
        )?;
        Ok(())
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_queue: 100,
            queue_timeout: Duration::from_secs(5),
        }
    }
}

/// Operation deadline bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline applied when none is given (1ms-5m).
    #[serde(rename = "default_ms", with = "duration_ms")]
    pub default: Duration,
    /// Hard ceiling on any requested deadline (>= default).
    #[serde(rename = "max_ms", with = "duration_ms")]
    pub max: Duration,
}

impl TimeoutConfig {
    pub fn new(default: Duration, max: Duration) -> Result<Self, ConfigError> {
        let config = Self { default, max };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration(
            "timeout.default",
            self.default,
            Duration::from_millis(1),
            Duration::from_secs(300),
        )?;
        if self.max < self.default {
            return Err(ConfigError::new(
                "timeout.max",
                format!("cannot be less than default ({:?})", self.default),
            ));
        }
        Ok(())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            max: Duration::from_secs(60),
        }
    }
}
