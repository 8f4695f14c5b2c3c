//! Circuit breaker guarding calls to one dependency.
//!
//! State transitions:
//! - Closed -> Open: consecutive failures reach the failure threshold
//! - Open -> HalfOpen: evaluated lazily at admission time once the open
//!   timeout has elapsed (no background timer)
//! - HalfOpen -> Closed: successes reach the success threshold
//! - HalfOpen -> Open: any single failure
//!
//! All mutable state lives behind one lock per instance; transitions are
//! totally ordered by a monotone version counter and each one emits exactly
//! one `circuit_state_change` event. Emission happens under the lock, which
//! the sink contract (non-blocking) makes safe and keeps event order equal
//! to transition order.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use event_core::{EventBuilder, EventType, Metadata};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{CircuitBreakerError, CodecError, ConfigError};

/// The three admission states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Calls fail fast without reaching the dependency.
    Open,
    /// A bounded number of probe calls test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exportable snapshot of a breaker, used for persistence and cross-replica
/// synchronization through a [`crate::state_store::StateStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub version: u64,
}

impl CircuitBreakerState {
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(data)?)
    }
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
    version: u64,
    /// Wall-clock anchor for the Open timeout.
    opened_at: Option<Instant>,
    /// Probe calls currently admitted while HalfOpen.
    half_open_in_flight: u32,
}

impl BreakerInner {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_state_change: Utc::now(),
            version: 0,
            opened_at: None,
            half_open_in_flight: 0,
        }
    }
}

/// Three-state machine guarding calls to a dependency.
///
/// Cloning shares the underlying state, so one breaker instance can guard a
/// dependency from many call sites.
#[derive(Clone)]
pub struct CircuitBreaker {
    service_name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    events: Option<EventBuilder>,
}

impl CircuitBreaker {
    pub fn new(
        service_name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            service_name: service_name.into(),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::fresh())),
            events: None,
        })
    }

    /// Attaches an event builder; every state transition emits one
    /// `circuit_state_change` event through it.
    pub fn with_events(mut self, events: EventBuilder) -> Self {
        self.events = Some(events);
        self
    }

    /// Rehydrates a breaker from a persisted snapshot.
    ///
    /// The Open timeout resumes from `last_state_change`, so a breaker that
    /// was already cooling down does not restart its clock.
    pub fn from_snapshot(config: CircuitBreakerConfig, snapshot: CircuitBreakerState) -> Self {
        let opened_at = match snapshot.state {
            CircuitState::Open => {
                let elapsed = (Utc::now() - snapshot.last_state_change)
                    .to_std()
                    .unwrap_or_default();
                Some(Instant::now().checked_sub(elapsed).unwrap_or_else(Instant::now))
            }
            _ => None,
        };
        Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: snapshot.state,
                failure_count: snapshot.failure_count,
                success_count: snapshot.success_count,
                last_failure_time: snapshot.last_failure_time,
                last_state_change: snapshot.last_state_change,
                version: snapshot.version,
                opened_at,
                half_open_in_flight: 0,
            })),
            events: None,
            service_name: snapshot.service_name,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Runs `op` under breaker protection. Returns
    /// [`CircuitBreakerError::Open`] without invoking `op` when not admitted.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.acquire() {
            return Err(CircuitBreakerError::Open {
                service: self.service_name.clone(),
            });
        }

        // If the caller drops us mid-operation the guard hands the probe
        // slot back, so abandoned calls cannot wedge a HalfOpen breaker.
        let guard = AdmissionGuard::new(self);
        match op().await {
            Ok(value) => {
                guard.success();
                Ok(value)
            }
            Err(e) => {
                guard.failure();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// Admission check. Performs the lazy Open -> HalfOpen transition and
    /// HalfOpen probe accounting; a `true` result must be paired with a
    /// later [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.timeout);
                if expired {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // Probe limit reached: reject without an event.
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Forces the circuit back to Closed, resetting counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        } else {
            inner.failure_count = 0;
            inner.success_count = 0;
        }
    }

    /// Current state (monitoring; does not perform the lazy transition).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Copies out the full state for serialization or persistence.
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        CircuitBreakerState {
            service_name: self.service_name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            last_state_change: inner.last_state_change,
            version: inner.version,
        }
    }

    /// Applies a transition under the caller's lock: bumps the version,
    /// stamps the change time, emits the event, then resets counters.
    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.version += 1;
        inner.last_state_change = Utc::now();
        inner.opened_at = match to {
            CircuitState::Open => Some(Instant::now()),
            _ => None,
        };

        let (failures, successes) = (inner.failure_count, inner.success_count);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_in_flight = 0;

        match to {
            CircuitState::Open => warn!(
                service = %self.service_name,
                version = inner.version,
                "circuit breaker: {from} -> {to}"
            ),
            _ => info!(
                service = %self.service_name,
                version = inner.version,
                "circuit breaker: {from} -> {to}"
            ),
        }

        if let Some(events) = &self.events {
            let mut metadata = Metadata::new();
            metadata.insert("previous_state".into(), from.as_str().into());
            metadata.insert("new_state".into(), to.as_str().into());
            metadata.insert("failure_count".into(), failures.into());
            metadata.insert("success_count".into(), successes.into());
            metadata.insert("version".into(), inner.version.into());
            events.emit(EventType::CircuitStateChange, metadata);
        }
    }
}

/// Tracks one admitted call until its outcome is recorded.
///
/// Dropping the guard without recording (the guarded future was cancelled)
/// returns the HalfOpen probe slot taken by [`CircuitBreaker::acquire`].
pub(crate) struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    recorded: bool,
}

impl<'a> AdmissionGuard<'a> {
    pub(crate) fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            recorded: false,
        }
    }

    pub(crate) fn success(mut self) {
        self.recorded = true;
        self.breaker.record_success();
    }

    pub(crate) fn failure(mut self) {
        self.recorded = true;
        self.breaker.record_failure();
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Struct literals so tests can use sub-second timeouts.
    fn config(failure: u32, success: u32, timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failure,
            success_threshold: success,
            timeout,
            half_open_max_calls: 3,
        }
    }

    // Built directly for the same reason: `new` validates the timeout range.
    fn breaker(name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker {
            service_name: name.to_string(),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::fresh())),
            events: None,
        }
    }

    #[tokio::test]
    async fn closed_to_open_on_consecutive_failures() {
        let cb = breaker("svc", config(3, 2, Duration::from_millis(100)));

        for _ in 0..3 {
            let _ = cb.execute(|| async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn one_failure_below_threshold_stays_closed() {
        let cb = breaker("svc", config(3, 2, Duration::from_millis(100)));
        for _ in 0..2 {
            let _ = cb.execute(|| async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_count() {
        let cb = breaker("svc", config(3, 2, Duration::from_millis(100)));
        for _ in 0..2 {
            let _ = cb.execute(|| async { Err::<(), _>("error") }).await;
        }
        let _ = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        for _ in 0..2 {
            let _ = cb.execute(|| async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_to_half_open_is_lazy() {
        let cb = breaker("svc", config(1, 1, Duration::from_millis(100)));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // No call arrives: state stays Open even though only readers looked.
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_transitions_to_half_open_after_timeout() {
        let cb = breaker("svc", config(2, 2, Duration::from_millis(100)));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let cb = breaker("svc", config(1, 1, Duration::from_millis(100)));
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_any_failure() {
        let cb = breaker("svc", config(1, 5, Duration::from_millis(100)));
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Enter HalfOpen with one success, then fail.
        assert!(cb.acquire());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert!(cb.acquire());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_probe_limit_rejects_excess_calls() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 10,
            timeout: Duration::from_millis(100),
            half_open_max_calls: 2,
        };
        let cb = breaker("svc", config);
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cb.acquire()); // lazy transition, probe 1
        assert!(cb.acquire()); // probe 2
        assert!(!cb.acquire()); // over the probe limit
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // A finished probe frees a slot.
        cb.record_success();
        assert!(cb.acquire());
    }

    #[test]
    fn constructor_rejects_invalid_config() {
        let bad = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(CircuitBreaker::new("svc", bad).is_err());
        CircuitBreaker::new("svc", CircuitBreakerConfig::default()).unwrap();
    }

    #[tokio::test]
    async fn dropped_execute_future_releases_probe_slot() {
        let cb = breaker(
            "svc",
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 2,
                timeout: Duration::from_millis(100),
                half_open_max_calls: 1,
            },
        );
        cb.record_failure();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The probe is admitted, then abandoned before it resolves.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cb.execute(|| std::future::pending::<Result<(), &str>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // The slot came back: the next probe is admitted and can close.
        assert!(cb.acquire());
        cb.record_success();
    }

    #[test]
    fn transitions_bump_version_monotonically() {
        let cb = breaker("svc", config(1, 1, Duration::from_millis(100)));
        assert_eq!(cb.snapshot().version, 0);
        cb.record_failure();
        assert_eq!(cb.snapshot().version, 1);
        cb.reset();
        assert_eq!(cb.snapshot().version, 2);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let cb = breaker("payments", config(2, 1, Duration::from_millis(100)));
        cb.record_failure();
        cb.record_failure();

        let snapshot = cb.snapshot();
        let json = snapshot.to_json().unwrap();
        let restored = CircuitBreakerState::from_json(&json).unwrap();
        assert_eq!(snapshot, restored);
        assert_eq!(restored.state, CircuitState::Open);
        assert!(restored.last_failure_time.is_some());
    }

    #[test]
    fn fresh_snapshot_omits_absent_failure_time() {
        let cb = breaker("payments", config(2, 1, Duration::from_millis(100)));
        let json = cb.snapshot().to_json().unwrap();
        assert!(!json.contains("last_failure_time"));
        let restored = CircuitBreakerState::from_json(&json).unwrap();
        assert_eq!(restored.last_failure_time, None);
    }

    #[test]
    fn state_serializes_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
        assert_eq!(serde_json::to_string(&CircuitState::Closed).unwrap(), "\"CLOSED\"");
    }

    #[test]
    fn unknown_state_string_is_a_decode_error() {
        let json = r#"{
            "service_name": "svc",
            "state": "WEDGED",
            "failure_count": 0,
            "success_count": 0,
            "last_state_change": "2025-01-01T00:00:00Z",
            "version": 1
        }"#;
        assert!(CircuitBreakerState::from_json(json).is_err());
    }

    #[test]
    fn from_snapshot_resumes_open_cooldown() {
        let snapshot = CircuitBreakerState {
            service_name: "svc".to_string(),
            state: CircuitState::Open,
            failure_count: 0,
            success_count: 0,
            last_failure_time: Some(Utc::now()),
            last_state_change: Utc::now() - chrono::Duration::seconds(10),
            version: 7,
        };
        let cb = CircuitBreaker::from_snapshot(config(1, 1, Duration::from_secs(1)), snapshot);

        // The cooldown expired before the restart, so the next call probes.
        assert!(cb.acquire());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().version, 8);
    }
}
