//! Synchronization events and subscription scopes.

use crate::{AgentId, EventId, MemoryRecord, RecordId, SharingPolicy, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of record transition carried by an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    Created,
    Updated,
    Deleted,
    SharingChanged,
}

/// Immutable notification of a record transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncEvent {
    /// Unique id for the event.
    pub id: EventId,
    /// Transition kind.
    pub event_type: SyncEventType,
    /// Record the event is about.
    pub record_id: RecordId,
    /// Agent that performed the transition.
    pub agent_id: AgentId,
    /// Owner of the record.
    pub owner_agent_id: AgentId,
    /// Record category at the time of the event.
    #[serde(default)]
    pub category: String,
    /// Record shared space at the time of the event.
    #[serde(default)]
    pub space: Option<String>,
    /// Record policy at the time of the event.
    pub sharing_policy: SharingPolicy,
    /// Timestamp when the event was created.
    pub timestamp: DateTime<Utc>,
    /// Event details; never carries full content.
    #[serde(default)]
    pub payload: Value,
}

impl SyncEvent {
    /// Build an event describing a transition of `record` made by `agent_id`.
    pub fn for_record(
        event_type: SyncEventType,
        record: &MemoryRecord,
        agent_id: impl Into<AgentId>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            record_id: record.id,
            agent_id: agent_id.into(),
            owner_agent_id: record.owner_agent_id.clone(),
            category: record.category.clone(),
            space: record.space.clone(),
            sharing_policy: record.sharing_policy.clone(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Which events a subscription is interested in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ChannelScope {
    /// Records owned by the subscribing agent.
    Owned,
    /// Records in the named category.
    Category(String),
    /// Records in the named shared space.
    Space(String),
    /// A single record.
    Record(RecordId),
}

impl ChannelScope {
    /// Whether the event falls inside this scope for the given subscriber.
    pub fn matches(&self, subscriber: &str, event: &SyncEvent) -> bool {
        match self {
            ChannelScope::Owned => event.owner_agent_id == subscriber,
            ChannelScope::Category(category) => {
                event.space.is_none() && !category.is_empty() && event.category == *category
            }
            ChannelScope::Space(space) => event.space.as_deref() == Some(space.as_str()),
            ChannelScope::Record(record_id) => event.record_id == *record_id,
        }
    }
}

/// Handle returned by subscribe and accepted by unsubscribe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Subscribing agent.
    pub agent_id: AgentId,
}

/// Sink interface for fire-and-forget event emission.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: SyncEvent);
}
