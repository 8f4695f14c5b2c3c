/// Resilience patterns for microservices
///
/// This library provides production-ready resilience patterns including:
/// - **Circuit Breaker**: Fails fast when a downstream keeps erroring, then probes for recovery
/// - **Retry**: Exponential backoff with jitter for transient failures
/// - **Rate Limiter**: Token bucket or sliding window admission per identity key
/// - **Bulkhead**: Bounded concurrency with a FIFO wait queue
/// - **Timeout**: Enforces time limits on external calls
/// - **Policies & Presets**: Per-service configuration bundles, pre-tuned for gRPC, Database, Redis, etc.
///
/// Every pattern can emit structured [`event_core`] events when the guarded
/// service changes state, retries, or rejects a call.
///
/// # Example: gRPC Client with Circuit Breaker
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let policy = presets::grpc_policy("user-service");
///     let circuit_breaker =
///         CircuitBreaker::new("user-service", policy.circuit_breaker.unwrap()).unwrap();
///
///     let result = circuit_breaker.execute(|| async {
///         // Your gRPC call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
///
/// # Example: Retrying a Flaky Call
///
/// ```rust,no_run
/// use resilience::{RetryConfig, RetryExecutor};
///
/// #[tokio::main]
/// async fn main() {
///     let retry = RetryExecutor::new("user-service", RetryConfig::default()).unwrap();
///
///     let result = retry.execute(|| async {
///         // Your call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod policy;
pub mod presets;
pub mod rate_limit;
pub mod retry;
pub mod state_store;
pub mod timeout;

// Re-export main types for convenience
pub use bulkhead::{Bulkhead, BulkheadMetrics, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
pub use config::{
    BulkheadConfig, CircuitBreakerConfig, RateLimitAlgorithm, RateLimitConfig, RetryConfig,
    TimeoutConfig,
};
pub use error::{
    BulkheadError, CircuitBreakerError, CodecError, ConfigError, RetryError, TimeoutError,
};
pub use policy::Policy;
pub use rate_limit::{
    limiter_for_config, Decision, RateLimitBackend, RateLimiter, SlidingWindowLimiter,
    TokenBucketLimiter,
};
pub use retry::{FixedJitter, JitterSource, RetryExecutor, ThreadRngJitter};
pub use state_store::{InMemoryStateStore, StateStore};
pub use timeout::{effective_deadline, with_timeout, with_timeout_result};
