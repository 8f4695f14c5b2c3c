//! Request correlation lookup.
//!
//! A correlation provider is a zero-argument function yielding an opaque
//! string that links events across a call chain. The default returns the
//! empty string and never panics or blocks; services typically supply one
//! reading from request-scoped context.

use std::sync::Arc;

/// Best-effort supplier of the current correlation id.
pub type CorrelationProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Returns the no-op provider (empty correlation id).
pub fn default_provider() -> CorrelationProvider {
    Arc::new(String::new)
}

/// Substitutes the default provider when none was supplied.
pub fn ensure(provider: Option<CorrelationProvider>) -> CorrelationProvider {
    provider.unwrap_or_else(default_provider)
}
