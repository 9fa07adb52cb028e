use agora_rs_core::{DeliveryError, EventCallback};
use agora_rs_protocol::SyncEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Event callback that records what it receives.
///
/// It can be told to fail the next few deliveries, to report itself
/// disconnected, or to never answer at all.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<SyncEvent>>,
    batch_sizes: Mutex<Vec<usize>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    disconnected: AtomicBool,
    hanging: AtomicBool,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` delivery attempts.
    pub fn failing(count: usize) -> Self {
        let subscriber = Self::default();
        subscriber.failures_left.store(count, Ordering::SeqCst);
        subscriber
    }

    /// Report every delivery as disconnected.
    pub fn disconnected() -> Self {
        let subscriber = Self::default();
        subscriber.disconnected.store(true, Ordering::SeqCst);
        subscriber
    }

    /// Never complete a delivery.
    pub fn hanging() -> Self {
        let subscriber = Self::default();
        subscriber.hanging.store(true, Ordering::SeqCst);
        subscriber
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    /// Delivery attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` events arrived or `timeout` elapsed, then
    /// return what was received.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SyncEvent> {
        let _ = tokio::time::timeout(timeout, async {
            while self.events.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        self.events()
    }

    /// Wait until at least `count` attempts were made or `timeout` elapsed.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let _ = tokio::time::timeout(timeout, async {
            while self.attempts() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        self.attempts()
    }
}

#[async_trait]
impl EventCallback for RecordingSubscriber {
    async fn deliver(&self, events: &[SyncEvent]) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(DeliveryError::Disconnected);
        }
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Failed("subscriber busy".to_string()));
        }
        self.batch_sizes.lock().push(events.len());
        self.events.lock().extend_from_slice(events);
        Ok(())
    }
}
