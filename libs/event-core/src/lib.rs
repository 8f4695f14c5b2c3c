//! Event plumbing shared by the resilience patterns.
//!
//! Every pattern reports state transitions through the same pipeline: a
//! time-ordered [`EventId`], a best-effort correlation id, a typed
//! [`ResilienceEvent`], and an [`EventEmitter`] sink. Emission is
//! fire-and-forget; a missing or failing sink never affects the caller.

pub mod builder;
pub mod correlation;
pub mod emitter;
pub mod event;
pub mod id;

pub use builder::EventBuilder;
pub use correlation::{default_provider, ensure, CorrelationProvider};
pub use emitter::{ChannelEmitter, EventEmitter, NoopEmitter, SinkMessage};
pub use event::{AuditEvent, EventType, Metadata, ResilienceEvent};
pub use id::EventId;
