//! Rate limiting with interchangeable admission algorithms.
//!
//! Both limiters share one contract: [`RateLimiter::allow`] returns a
//! [`Decision`] and never an error. When a distributed backend is attached
//! it is consulted first; a backend failure falls back to the local
//! in-memory algorithm with a warning, and the next successful backend call
//! recovers silently. Rejections never mutate admitted-call state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_core::{EventBuilder, EventType, Metadata};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{RateLimitAlgorithm, RateLimitConfig};

/// Admission verdict for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
    /// How long the caller should wait before trying again; zero when
    /// allowed.
    pub retry_after: Duration,
}

/// Admits or rejects calls against a throughput budget, per identity key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, key: &str) -> Decision;
}

/// Distributed admission backend (Redis or similar). External collaborator;
/// failures are expected and handled by local fallback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn allow(&self, key: &str, config: &RateLimitConfig) -> anyhow::Result<Decision>;
}

/// Builds the limiter matching the config's algorithm.
pub fn limiter_for_config(
    service_name: impl Into<String>,
    config: RateLimitConfig,
    backend: Option<Arc<dyn RateLimitBackend>>,
    events: Option<EventBuilder>,
) -> Arc<dyn RateLimiter> {
    match config.algorithm {
        RateLimitAlgorithm::TokenBucket => Arc::new(TokenBucketLimiter {
            shared: LimiterShared::new(service_name, config, backend, events),
            buckets: Mutex::new(HashMap::new()),
        }),
        RateLimitAlgorithm::SlidingWindow => Arc::new(SlidingWindowLimiter {
            shared: LimiterShared::new(service_name, config, backend, events),
            windows: Mutex::new(HashMap::new()),
        }),
    }
}

/// State common to both algorithms: config, optional backend, fallback
/// tracking, and event emission.
struct LimiterShared {
    service_name: String,
    config: RateLimitConfig,
    backend: Option<Arc<dyn RateLimitBackend>>,
    backend_down: AtomicBool,
    events: Option<EventBuilder>,
}

impl LimiterShared {
    fn new(
        service_name: impl Into<String>,
        config: RateLimitConfig,
        backend: Option<Arc<dyn RateLimitBackend>>,
        events: Option<EventBuilder>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            config,
            backend,
            backend_down: AtomicBool::new(false),
            events,
        }
    }

    /// Consults the backend; `None` means fall through to the local
    /// algorithm.
    async fn try_backend(&self, key: &str) -> Option<Decision> {
        let backend = self.backend.as_ref()?;
        match backend.allow(key, &self.config).await {
            Ok(decision) => {
                if self.backend_down.swap(false, Ordering::Relaxed) {
                    info!(
                        service = %self.service_name,
                        "rate limit backend recovered"
                    );
                }
                Some(decision)
            }
            Err(e) => {
                if !self.backend_down.swap(true, Ordering::Relaxed) {
                    warn!(
                        service = %self.service_name,
                        error = %e,
                        "rate limit backend unreachable, using local fallback"
                    );
                }
                None
            }
        }
    }

    fn report(&self, key: &str, decision: &Decision) {
        if decision.allowed {
            return;
        }
        if let Some(events) = &self.events {
            let mut metadata = Metadata::new();
            metadata.insert("key".into(), key.into());
            metadata.insert("limit".into(), decision.limit.into());
            metadata.insert("remaining".into(), decision.remaining.into());
            metadata.insert(
                "retry_after_ms".into(),
                (decision.retry_after.as_millis() as u64).into(),
            );
            events.emit(EventType::RateLimitHit, metadata);
        }
    }
}

/// Token bucket: refills at `limit/window`, holds at most `burst_size`
/// tokens, spends one per admitted call.
pub struct TokenBucketLimiter {
    shared: LimiterShared,
    buckets: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketLimiter {
    pub fn new(service_name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            shared: LimiterShared::new(service_name, config, None, None),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn RateLimitBackend>) -> Self {
        self.shared.backend = Some(backend);
        self
    }

    pub fn with_events(mut self, events: EventBuilder) -> Self {
        self.shared.events = Some(events);
        self
    }

    fn refill_rate(&self) -> f64 {
        let config = &self.shared.config;
        config.limit as f64 / config.window.as_secs_f64()
    }

    fn allow_local(&self, key: &str) -> Decision {
        let config = &self.shared.config;
        let rate = self.refill_rate();
        let capacity = config.burst_size as f64;
        let now = Instant::now();

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            let refill_gap = Duration::from_secs_f64(1.0 / rate);
            Decision {
                allowed: true,
                remaining: bucket.tokens as u32,
                limit: config.limit,
                reset_at: Utc::now() + chrono::Duration::from_std(refill_gap).unwrap_or_default(),
                retry_after: Duration::ZERO,
            }
        } else {
            // Time until the next whole token accrues.
            let deficit = 1.0 - bucket.tokens;
            let retry_after = Duration::from_secs_f64(deficit / rate);
            Decision {
                allowed: false,
                remaining: 0,
                limit: config.limit,
                reset_at: Utc::now() + chrono::Duration::from_std(retry_after).unwrap_or_default(),
                retry_after,
            }
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn allow(&self, key: &str) -> Decision {
        let decision = match self.shared.try_backend(key).await {
            Some(decision) => decision,
            None => self.allow_local(key),
        };
        self.shared.report(key, &decision);
        decision
    }
}

/// Sliding window: keeps timestamps of admitted calls per key and admits
/// only while fewer than `limit` fall inside the trailing window.
pub struct SlidingWindowLimiter {
    shared: LimiterShared,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(service_name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            shared: LimiterShared::new(service_name, config, None, None),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn RateLimitBackend>) -> Self {
        self.shared.backend = Some(backend);
        self
    }

    pub fn with_events(mut self, events: EventBuilder) -> Self {
        self.shared.events = Some(events);
        self
    }

    fn allow_local(&self, key: &str) -> Decision {
        let config = &self.shared.config;
        let now = Instant::now();

        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_default();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= config.window)
        {
            window.pop_front();
        }

        if (window.len() as u32) < config.limit {
            window.push_back(now);
            Decision {
                allowed: true,
                remaining: config.limit - window.len() as u32,
                limit: config.limit,
                reset_at: Utc::now()
                    + chrono::Duration::from_std(config.window).unwrap_or_default(),
                retry_after: Duration::ZERO,
            }
        } else {
            // Rejection leaves the admitted timestamps untouched.
            let oldest_age = window
                .front()
                .map(|t| now.duration_since(*t))
                .unwrap_or_default();
            let retry_after = config.window.saturating_sub(oldest_age);
            Decision {
                allowed: false,
                remaining: 0,
                limit: config.limit,
                reset_at: Utc::now() + chrono::Duration::from_std(retry_after).unwrap_or_default(),
                retry_after,
            }
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, key: &str) -> Decision {
        let decision = match self.shared.try_backend(key).await {
            Some(decision) => decision,
            None => self.allow_local(key),
        };
        self.shared.report(key, &decision);
        decision
    }
}
