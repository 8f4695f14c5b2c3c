//! Emission sinks.
//!
//! Sinks accept events without returning errors: a broken or saturated sink
//! must never affect the business outcome of the call that produced the
//! event. Implementations are required to be non-blocking, which lets a
//! pattern emit while holding its state lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::event::{AuditEvent, ResilienceEvent};

/// Destination for events. Must not block and must not panic.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: ResilienceEvent);
    fn emit_audit(&self, event: AuditEvent);
}

/// Discards everything. Useful as a deployment default and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: ResilienceEvent) {}
    fn emit_audit(&self, _event: AuditEvent) {}
}

/// A message forwarded by a [`ChannelEmitter`].
#[derive(Debug, Clone)]
pub enum SinkMessage {
    Event(ResilienceEvent),
    Audit(AuditEvent),
}

/// Forwards events into a bounded channel, dropping when full.
///
/// The consumer half drains `SinkMessage`s and ships them wherever the
/// deployment wants (console, message queue). Drops are counted and logged
/// rather than surfaced to emitters.
pub struct ChannelEmitter {
    tx: mpsc::Sender<SinkMessage>,
    dropped: AtomicU64,
}

impl ChannelEmitter {
    /// Creates an emitter with the given buffer capacity and hands back the
    /// receiving half.
    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::Receiver<SinkMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                tx,
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Number of messages dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, message: SinkMessage) {
        if self.tx.try_send(message).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped = total, "event sink full, dropping event");
        }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: ResilienceEvent) {
        self.forward(SinkMessage::Event(event));
    }

    fn emit_audit(&self, event: AuditEvent) {
        self.forward(SinkMessage::Audit(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Metadata};
    use crate::id::EventId;
    use chrono::Utc;

    fn event() -> ResilienceEvent {
        ResilienceEvent {
            id: EventId::generate().to_string(),
            event_type: EventType::RetryAttempt,
            service_name: "svc".to_string(),
            timestamp: Utc::now(),
            correlation_id: String::new(),
            trace_id: String::new(),
            span_id: String::new(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn channel_emitter_delivers_in_order() {
        let (emitter, mut rx) = ChannelEmitter::with_capacity(4);
        emitter.emit(event());
        emitter.emit(event());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, SinkMessage::Event(_)));
        assert!(matches!(second, SinkMessage::Event(_)));
        assert_eq!(emitter.dropped(), 0);
    }

    #[tokio::test]
    async fn channel_emitter_drops_when_full() {
        let (emitter, _rx) = ChannelEmitter::with_capacity(1);
        emitter.emit(event());
        emitter.emit(event());
        emitter.emit(event());
        assert_eq!(emitter.dropped(), 2);
    }

    #[test]
    fn noop_emitter_accepts_everything() {
        let emitter = NoopEmitter;
        emitter.emit(event());
    }
}
