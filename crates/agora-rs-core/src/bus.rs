//! Event synchronization bus.
//!
//! Every subscription owns a bounded FIFO queue drained by a single worker
//! task, so events reach each subscriber in the order they were enqueued and a
//! slow or failing subscriber never holds up another one. Delivery is
//! best-effort: there is no durable log and no replay for late subscribers,
//! and a subscriber whose queue is full misses events until it drains.

use crate::access::{AccessEvaluator, AccessTarget};
use agora_rs_config::BusConfig;
use agora_rs_protocol::{
    AgentId, ChannelScope, EventId, EventSink, SubscriptionHandle, SubscriptionId, SyncEvent,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Why a delivery attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Transient failure; the batch is retried.
    #[error("delivery failed: {0}")]
    Failed(String),
    /// The subscriber is gone; its subscription is removed.
    #[error("subscriber disconnected")]
    Disconnected,
}

#[async_trait]
/// Receives batches of events for one subscription, in order.
pub trait EventCallback: Send + Sync {
    async fn deliver(&self, events: &[SyncEvent]) -> Result<(), DeliveryError>;
}

/// Acknowledgement returned by [`SyncBus::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    pub event_id: EventId,
    /// Subscriptions the event was enqueued for.
    pub recipients: usize,
}

struct Subscription {
    handle: SubscriptionHandle,
    scope: ChannelScope,
    sender: mpsc::Sender<SyncEvent>,
}

struct BusInner {
    registry: RwLock<HashMap<SubscriptionId, Subscription>>,
    access: AccessEvaluator,
    config: BusConfig,
}

/// Publish/subscribe bus with access-filtered fan-out.
///
/// Each bus owns its registry; clones share it.
#[derive(Clone)]
pub struct SyncBus {
    inner: Arc<BusInner>,
}

impl SyncBus {
    pub fn new(access: AccessEvaluator, config: BusConfig) -> Self {
        debug!(
            "sync bus initialized (batch_size={}, max_retries={}, queue_capacity={})",
            config.batch_size, config.max_retries, config.queue_capacity
        );
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(HashMap::new()),
                access,
                config,
            }),
        }
    }

    /// Register a callback for events in `scope` and start its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(
        &self,
        agent_id: impl Into<AgentId>,
        scope: ChannelScope,
        callback: Arc<dyn EventCallback>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
        };
        let (sender, receiver) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        self.inner.registry.write().insert(
            handle.id,
            Subscription {
                handle: handle.clone(),
                scope: scope.clone(),
                sender,
            },
        );
        tokio::spawn(run_worker(
            handle.clone(),
            receiver,
            callback,
            self.inner.config.clone(),
            Arc::downgrade(&self.inner),
        ));
        info!(
            "subscription registered (id={}, agent_id={}, scope={:?})",
            handle.id, handle.agent_id, scope
        );
        handle
    }

    /// Remove a subscription. Events already queued are still delivered.
    ///
    /// Returns false when the handle is unknown or belongs to another agent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut registry = self.inner.registry.write();
        let owned = registry
            .get(&handle.id)
            .is_some_and(|subscription| subscription.handle.agent_id == handle.agent_id);
        if owned {
            registry.remove(&handle.id);
            info!(
                "subscription removed (id={}, agent_id={})",
                handle.id, handle.agent_id
            );
        }
        owned
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Fan an event out to every subscription whose scope matches and whose
    /// agent may read the record.
    ///
    /// Recipients are resolved first; the event is then enqueued to all of
    /// them without suspending, so a cancelled publish reaches either every
    /// recipient or none. Two publishes from the same task are delivered in
    /// call order. A subscriber whose membership cannot be looked up, or whose
    /// queue is full, misses this event; the others still get it.
    pub async fn publish(&self, event: SyncEvent) -> PublishAck {
        let candidates: Vec<(SubscriptionId, AgentId)> = self
            .inner
            .registry
            .read()
            .values()
            .filter(|subscription| {
                subscription
                    .scope
                    .matches(&subscription.handle.agent_id, &event)
            })
            .map(|subscription| (subscription.handle.id, subscription.handle.agent_id.clone()))
            .collect();

        let mut eligible = Vec::with_capacity(candidates.len());
        let mut readers: HashMap<AgentId, bool> = HashMap::new();
        for (id, agent_id) in candidates {
            let allowed = match readers.get(&agent_id) {
                Some(allowed) => *allowed,
                None => {
                    let mut reader = self.inner.access.reader(&agent_id);
                    let allowed = match reader.allows(AccessTarget::from(&event)).await {
                        Ok(allowed) => allowed,
                        Err(err) => {
                            warn!(
                                "access check failed, skipping subscriber \
                                 (event_id={}, agent_id={}, error={err})",
                                event.id, agent_id
                            );
                            false
                        }
                    };
                    readers.insert(agent_id.clone(), allowed);
                    allowed
                }
            };
            if allowed {
                eligible.push(id);
            }
        }

        let recipients = {
            let registry = self.inner.registry.read();
            eligible
                .iter()
                .filter_map(|id| registry.get(id))
                .filter(|subscription| enqueue(subscription, &event))
                .count()
        };
        debug!(
            "event published (event_id={}, type={:?}, record_id={}, recipients={})",
            event.id, event.event_type, event.record_id, recipients
        );
        PublishAck {
            event_id: event.id,
            recipients,
        }
    }
}

fn enqueue(subscription: &Subscription, event: &SyncEvent) -> bool {
    match subscription.sender.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(
                "subscriber queue full, dropping event \
                 (subscription_id={}, agent_id={}, event_id={})",
                subscription.handle.id, subscription.handle.agent_id, event.id
            );
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Fire-and-forget bridge: publishes on the current runtime and logs failures.
impl EventSink for SyncBus {
    fn emit(&self, event: SyncEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("dropping event outside a runtime (event_id={})", event.id);
            return;
        };
        let bus = self.clone();
        runtime.spawn(async move {
            bus.publish(event).await;
        });
    }
}

enum Delivery {
    Delivered,
    Dropped,
    Disconnected,
}

async fn run_worker(
    handle: SubscriptionHandle,
    mut receiver: mpsc::Receiver<SyncEvent>,
    callback: Arc<dyn EventCallback>,
    config: BusConfig,
    bus: Weak<BusInner>,
) {
    let batch_size = config.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    while let Some(event) = receiver.recv().await {
        batch.clear();
        batch.push(event);
        while batch.len() < batch_size {
            match receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        match deliver_with_retry(callback.as_ref(), &batch, &config).await {
            Delivery::Delivered => {}
            Delivery::Dropped => warn!(
                "dropping events after retries (subscription_id={}, agent_id={}, events={})",
                handle.id,
                handle.agent_id,
                batch.len()
            ),
            Delivery::Disconnected => {
                if let Some(bus) = bus.upgrade() {
                    bus.registry.write().remove(&handle.id);
                }
                info!(
                    "subscriber disconnected (subscription_id={}, agent_id={})",
                    handle.id, handle.agent_id
                );
                return;
            }
        }

        if batch.len() == batch_size && config.batch_interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.batch_interval_ms)).await;
        }
    }
    debug!("subscription worker stopped (subscription_id={})", handle.id);
}

async fn deliver_with_retry(
    callback: &dyn EventCallback,
    batch: &[SyncEvent],
    config: &BusConfig,
) -> Delivery {
    let timeout = Duration::from_millis(config.delivery_timeout_ms);
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(timeout, callback.deliver(batch)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeliveryError::Failed(format!(
                "no answer within {}ms",
                config.delivery_timeout_ms
            ))),
        };
        match outcome {
            Ok(()) => return Delivery::Delivered,
            Err(DeliveryError::Disconnected) => return Delivery::Disconnected,
            Err(DeliveryError::Failed(reason)) => {
                if attempt >= config.max_retries {
                    warn!("delivery failed (attempts={}, error={reason})", attempt + 1);
                    return Delivery::Dropped;
                }
                let backoff = config
                    .retry_backoff_ms
                    .saturating_mul(1u64 << attempt.min(10));
                debug!(
                    "delivery failed, retrying (attempt={}, backoff_ms={backoff}, error={reason})",
                    attempt + 1
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
        }
    }
}
