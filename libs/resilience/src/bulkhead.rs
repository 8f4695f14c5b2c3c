//! Concurrency isolation via a bounded execution slot pool.
//!
//! At most `max_concurrent` calls run at once; up to `max_queue` more wait
//! in FIFO order for a slot. A call that would exceed the queue bound is
//! rejected immediately with [`BulkheadError::Full`]; a queued call that
//! outlives `queue_timeout` is rejected with [`BulkheadError::QueueTimeout`].

use std::sync::Arc;

use event_core::{EventBuilder, EventType, Metadata};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::config::BulkheadConfig;
use crate::error::{BulkheadError, ConfigError};

/// Point-in-time occupancy of the bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadMetrics {
    pub active: u32,
    pub queued: u32,
    pub max_concurrent: u32,
    pub max_queue: u32,
}

/// Bounds concurrent access to a resource, queueing overflow up to a limit.
#[derive(Clone)]
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    queued: Arc<Mutex<u32>>,
    events: Option<EventBuilder>,
}

/// Slot held for the duration of one call. Dropping it frees the slot for
/// the longest-waiting queued caller.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent as usize)),
            queued: Arc::new(Mutex::new(0)),
            name: name.into(),
            config,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventBuilder) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> BulkheadMetrics {
        let available = self.semaphore.available_permits() as u32;
        BulkheadMetrics {
            active: self.config.max_concurrent.saturating_sub(available),
            queued: *self.queued.lock(),
            max_concurrent: self.config.max_concurrent,
            max_queue: self.config.max_queue,
        }
    }

    /// Acquires an execution slot, waiting in the queue if the pool is at
    /// capacity.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadError> {
        // Fast path: a slot is free right now.
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(BulkheadPermit { _permit: permit });
        }

        // Slow path: join the queue if there is room. The counter check and
        // increment happen under one lock so concurrent arrivals cannot
        // both claim the last queue slot.
        {
            let mut queued = self.queued.lock();
            if *queued >= self.config.max_queue {
                drop(queued);
                self.reject("full");
                return Err(BulkheadError::Full {
                    name: self.name.clone(),
                    max_concurrent: self.config.max_concurrent,
                    max_queue: self.config.max_queue,
                });
            }
            *queued += 1;
        }

        let acquired = tokio::time::timeout(
            self.config.queue_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;

        *self.queued.lock() -= 1;

        match acquired {
            Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
            Ok(Err(_closed)) => {
                // The semaphore is never closed while a Bulkhead exists.
                self.reject("full");
                Err(BulkheadError::Full {
                    name: self.name.clone(),
                    max_concurrent: self.config.max_concurrent,
                    max_queue: self.config.max_queue,
                })
            }
            Err(_elapsed) => {
                self.reject("queue_timeout");
                Err(BulkheadError::QueueTimeout {
                    name: self.name.clone(),
                    waited: self.config.queue_timeout,
                })
            }
        }
    }

    /// Runs `operation` inside an execution slot.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, BulkheadError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(operation().await)
    }

    fn reject(&self, reason: &str) {
        let metrics = self.metrics();
        warn!(
            bulkhead = %self.name,
            reason,
            active = metrics.active,
            queued = metrics.queued,
            "bulkhead rejected call"
        );
        if let Some(events) = &self.events {
            let mut metadata = Metadata::new();
            metadata.insert("bulkhead".into(), self.name.clone().into());
            metadata.insert("reason".into(), reason.into());
            metadata.insert("max_concurrent".into(), self.config.max_concurrent.into());
            metadata.insert("max_queue".into(), self.config.max_queue.into());
            events.emit(EventType::BulkheadRejection, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn config(max_concurrent: u32, max_queue: u32, queue_timeout: Duration) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent,
            max_queue,
            queue_timeout,
        }
    }

    #[tokio::test]
    async fn admits_up_to_max_concurrent() {
        let bulkhead = Bulkhead::new("db", config(2, 1, Duration::from_secs(1))).unwrap();

        let p1 = bulkhead.acquire().await.unwrap();
        let p2 = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.metrics().active, 2);

        drop(p1);
        drop(p2);
        assert_eq!(bulkhead.metrics().active, 0);
    }

    #[tokio::test]
    async fn overflow_beyond_queue_is_rejected_full() {
        let bulkhead = Bulkhead::new("db", config(2, 1, Duration::from_secs(5))).unwrap();

        let _p1 = bulkhead.acquire().await.unwrap();
        let _p2 = bulkhead.acquire().await.unwrap();

        // Third call parks in the queue.
        let queued = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bulkhead.metrics().queued, 1);

        // Fourth call finds the queue full.
        match bulkhead.acquire().await {
            Err(BulkheadError::Full { max_concurrent, max_queue, .. }) => {
                assert_eq!(max_concurrent, 2);
                assert_eq!(max_queue, 1);
            }
            other => panic!("expected Full, got {other:?}"),
        }

        // Freeing a slot hands it to the queued caller.
        drop(_p1);
        let permit = queued.await.unwrap();
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn queued_call_times_out() {
        let bulkhead = Bulkhead::new("db", config(1, 1, Duration::from_millis(100))).unwrap();
        let _held = bulkhead.acquire().await.unwrap();

        match bulkhead.acquire().await {
            Err(BulkheadError::QueueTimeout { waited, .. }) => {
                assert_eq!(waited, Duration::from_millis(100));
            }
            other => panic!("expected QueueTimeout, got {other:?}"),
        }
        // The failed waiter left the queue.
        assert_eq!(bulkhead.metrics().queued, 0);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let bulkhead = Bulkhead::new("db", config(1, 2, Duration::from_secs(5))).unwrap();
        let held = bulkhead.acquire().await.unwrap();

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();

        {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let _p = bulkhead.acquire().await.unwrap();
                let _ = first_tx.send(1u32);
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let _p = bulkhead.acquire().await.unwrap();
                let _ = second_tx.send(2u32);
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(held);
        let first = first_rx.await.unwrap();
        let second = second_rx.await.unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test]
    async fn execute_returns_operation_output() {
        let bulkhead = Bulkhead::new("db", config(1, 0, Duration::from_millis(10))).unwrap();
        let out = bulkhead.execute(|| async { 42 }).await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(bulkhead.metrics().active, 0);
    }

    #[tokio::test]
    async fn zero_queue_rejects_immediately() {
        let bulkhead = Bulkhead::new("db", config(1, 0, Duration::from_secs(5))).unwrap();
        let _held = bulkhead.acquire().await.unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(
            bulkhead.acquire().await,
            Err(BulkheadError::Full { .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
