//! Persistence boundary for circuit-breaker state.
//!
//! The store is an external collaborator (Redis, a database, a mock); this
//! crate only defines the contract and an in-memory reference
//! implementation. Store failures surface to the caller and never take a
//! breaker down with them.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::circuit_breaker::CircuitBreakerState;

/// Save/load/delete circuit state by service name.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &CircuitBreakerState) -> anyhow::Result<()>;
    async fn load(&self, service_name: &str) -> anyhow::Result<Option<CircuitBreakerState>>;
    async fn delete(&self, service_name: &str) -> anyhow::Result<()>;
}

/// Process-local store. Reference implementation and test double.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, CircuitBreakerState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, state: &CircuitBreakerState) -> anyhow::Result<()> {
        self.states
            .write()
            .insert(state.service_name.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, service_name: &str) -> anyhow::Result<Option<CircuitBreakerState>> {
        Ok(self.states.read().get(service_name).cloned())
    }

    async fn delete(&self, service_name: &str) -> anyhow::Result<()> {
        self.states.write().remove(service_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreaker, CircuitState};
    use crate::config::CircuitBreakerConfig;

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let store = InMemoryStateStore::new();
        let cb = CircuitBreaker::new("payments", CircuitBreakerConfig::default()).unwrap();
        cb.record_failure();

        let snapshot = cb.snapshot();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load("payments").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        store.delete("payments").await.unwrap();
        assert!(store.load("payments").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn breaker_rehydrates_from_stored_state() {
        let store = InMemoryStateStore::new();
        let cb = CircuitBreaker::new("payments", CircuitBreakerConfig::default()).unwrap();
        for _ in 0..5 {
            cb.record_failure();
        }
        store.save(&cb.snapshot()).await.unwrap();

        let loaded = store.load("payments").await.unwrap().unwrap();
        let restored = CircuitBreaker::from_snapshot(CircuitBreakerConfig::default(), loaded);
        assert_eq!(restored.state(), CircuitState::Open);
        assert_eq!(restored.service_name(), "payments");
    }
}
