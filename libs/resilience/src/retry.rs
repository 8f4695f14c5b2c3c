//! Retry execution with exponential backoff and jitter.
//!
//! Delay before attempt `n` (0-indexed) is
//! `min(base_delay * multiplier^n, max_delay)`, perturbed by a uniform
//! offset in `[-delay*jitter, +delay*jitter]` and clamped to
//! `[0, max_delay]`. No delay precedes the first attempt or follows the
//! last failed one. The inter-attempt wait is the only suspension point and
//! can be interrupted by a caller-supplied cancellation future.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use event_core::{EventBuilder, EventType, Metadata};
use rand::Rng;
use tracing::warn;

use crate::circuit_breaker::{AdmissionGuard, CircuitBreaker};
use crate::config::RetryConfig;
use crate::error::{ConfigError, RetryError};

/// Source of jitter samples, uniform in `[-1.0, 1.0]`.
///
/// Injected per executor so tests can pin delays without touching
/// production call sites.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Default jitter from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// A fixed jitter sample; `FixedJitter(0.0)` disables jitter entirely.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Repeats a fallible async operation per a validated [`RetryConfig`].
#[derive(Clone)]
pub struct RetryExecutor {
    service_name: String,
    config: RetryConfig,
    jitter: Arc<dyn JitterSource>,
    events: Option<EventBuilder>,
}

impl RetryExecutor {
    pub fn new(service_name: impl Into<String>, config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            service_name: service_name.into(),
            config,
            jitter: Arc::new(ThreadRngJitter),
            events: None,
        })
    }

    /// Substitutes the jitter source (deterministic tests).
    pub fn with_jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attaches an event builder; each retry emits one `retry_attempt` event.
    pub fn with_events(mut self, events: EventBuilder) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Computed delay before retrying after attempt `attempt` (0-indexed).
    /// Always within `[0, max_delay]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max = self.config.max_delay.as_secs_f64();
        let base = self.config.base_delay.as_secs_f64();
        let exp = base * self.config.multiplier.powi(attempt as i32);
        let mut delay = exp.min(max);
        delay += delay * self.config.jitter * self.jitter.sample();
        Duration::from_secs_f64(delay.clamp(0.0, max))
    }

    /// Runs `op` up to `max_attempts` times. On exhaustion the last error is
    /// wrapped with the attempt count.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_cancellable(std::future::pending::<()>(), op)
            .await
    }

    /// Like [`execute`](Self::execute), but the inter-attempt wait races
    /// against `cancel`; when it fires the whole operation aborts with
    /// [`RetryError::Cancelled`], never with exhaustion.
    pub async fn execute_cancellable<C, F, Fut, T, E>(
        &self,
        cancel: C,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Future<Output = ()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        tokio::pin!(cancel);
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        warn!(
                            service = %self.service_name,
                            attempts = attempt,
                            "retry attempts exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }

                    let delay = self.delay_for_attempt(attempt - 1);
                    self.emit_attempt(attempt, delay, &e);

                    tokio::select! {
                        _ = &mut cancel => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Composes retry with a circuit breaker: every attempt first passes the
    /// breaker's admission check (aborting immediately when Open), and each
    /// outcome is reported to the breaker before the next retry decision.
    pub async fn execute_with_breaker<F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            if !breaker.acquire() {
                return Err(RetryError::CircuitOpen {
                    service: breaker.service_name().to_string(),
                });
            }

            // Returns the probe slot if we are dropped mid-attempt.
            let guard = AdmissionGuard::new(breaker);
            match op().await {
                Ok(value) => {
                    guard.success();
                    return Ok(value);
                }
                Err(e) => {
                    guard.failure();
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }

                    let delay = self.delay_for_attempt(attempt - 1);
                    self.emit_attempt(attempt, delay, &e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn emit_attempt<E: std::fmt::Display>(&self, attempt: u32, delay: Duration, error: &E) {
        if let Some(events) = &self.events {
            let mut metadata = Metadata::new();
            metadata.insert("attempt".into(), attempt.into());
            metadata.insert("max_attempts".into(), self.config.max_attempts.into());
            metadata.insert("delay_ms".into(), (delay.as_millis() as u64).into());
            metadata.insert("error".into(), error.to_string().into());
            events.emit(EventType::RetryAttempt, metadata);
        }
    }
}
