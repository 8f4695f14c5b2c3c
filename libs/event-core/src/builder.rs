//! Event construction and emission.

use std::sync::Arc;

use chrono::Utc;

use crate::correlation::{ensure, CorrelationProvider};
use crate::emitter::EventEmitter;
use crate::event::{AuditEvent, EventType, Metadata, ResilienceEvent};
use crate::id::EventId;

/// Builds fully stamped events and forwards them to the configured sink.
///
/// The builder owns the service name, the correlation provider, and an
/// optional sink. Emission through an absent sink is a no-op, never an error.
#[derive(Clone)]
pub struct EventBuilder {
    emitter: Option<Arc<dyn EventEmitter>>,
    service_name: String,
    correlation: CorrelationProvider,
    trace_id: String,
    span_id: String,
}

impl EventBuilder {
    pub fn new(
        emitter: Option<Arc<dyn EventEmitter>>,
        service_name: impl Into<String>,
        correlation: Option<CorrelationProvider>,
    ) -> Self {
        Self {
            emitter,
            service_name: service_name.into(),
            correlation: ensure(correlation),
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    /// Returns a builder that stamps the given trace context into every
    /// event it produces.
    pub fn with_trace(&self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.trace_id = trace_id.into();
        cloned.span_id = span_id.into();
        cloned
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Constructs an event with identifier, timestamp, service name, and
    /// correlation id filled in.
    pub fn build(&self, event_type: EventType, metadata: Metadata) -> ResilienceEvent {
        ResilienceEvent {
            id: EventId::generate().to_string(),
            event_type,
            service_name: self.service_name.clone(),
            timestamp: Utc::now(),
            correlation_id: (self.correlation)(),
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            metadata,
        }
    }

    /// Builds and forwards an event. No-op when no sink is configured.
    pub fn emit(&self, event_type: EventType, metadata: Metadata) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(self.build(event_type, metadata));
        }
    }

    /// Stamps identifier/timestamp/correlation onto an audit record and
    /// forwards it. No-op when no sink is configured.
    pub fn emit_audit(
        &self,
        event_type: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        outcome: impl Into<String>,
        metadata: Metadata,
    ) {
        if let Some(emitter) = &self.emitter {
            emitter.emit_audit(AuditEvent {
                id: EventId::generate().to_string(),
                event_type: event_type.into(),
                timestamp: Utc::now(),
                correlation_id: (self.correlation)(),
                action: action.into(),
                resource: resource.into(),
                outcome: outcome.into(),
                metadata,
            });
        }
    }
}
