//! Shared data model for Agora records, access decisions, sync events, and
//! progressive search results.

mod access;
mod dedup;
mod event;
mod record;
mod search;

pub use access::{AccessDecision, AccessReason, Capability};
pub use dedup::{DuplicateKind, DuplicateVerdict, RecommendedAction};
pub use event::{ChannelScope, EventSink, SubscriptionHandle, SyncEvent, SyncEventType};
pub use record::{EmbeddingRef, MembershipScope, MemoryRecord, SharingPolicy};
pub use search::{
    BatchResult, CompactResult, ExploreResult, FullRecord, IndexResult, OmitReason, Omission,
    RecordMetadata, TimelineEntry, TimelinePosition, TimelineResult,
};

use uuid::Uuid;

/// Unique identifier for a memory record.
pub type RecordId = Uuid;
/// Stable identifier for an agent.
pub type AgentId = String;
/// Unique identifier for a sync event.
pub type EventId = Uuid;
/// Unique identifier for a bus subscription.
pub type SubscriptionId = Uuid;
