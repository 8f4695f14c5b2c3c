//! Typed event records.
//!
//! The wire format is additive-only: consumers parsing known fields must
//! keep working across versions, so optional fields are omitted when empty
//! and new fields may only be appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form key/value payload attached to an event.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The kinds of events the resilience patterns report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CircuitStateChange,
    RetryAttempt,
    Timeout,
    RateLimitHit,
    BulkheadRejection,
    HealthChange,
    PolicyUpdated,
    ShutdownInitiated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CircuitStateChange => "circuit_state_change",
            EventType::RetryAttempt => "retry_attempt",
            EventType::Timeout => "timeout",
            EventType::RateLimitHit => "rate_limit_hit",
            EventType::BulkheadRejection => "bulkhead_rejection",
            EventType::HealthChange => "health_change",
            EventType::PolicyUpdated => "policy_updated",
            EventType::ShutdownInitiated => "shutdown_initiated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation emitted by a resilience pattern.
///
/// Immutable after construction; consumed once by the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A security/compliance audit record, delivered through the same sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub action: String,
    pub resource: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}
