//! Result types for the three progressive disclosure layers.

use crate::{AgentId, RecordId, SharingPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layer-1 result: summary only, never full content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompactResult {
    pub record_id: RecordId,
    pub summary: String,
    pub category: String,
    pub owner_agent_id: AgentId,
    pub created_at: DateTime<Utc>,
    /// Hybrid relevance score.
    pub score: f32,
    /// Estimated token cost of this result.
    pub estimated_tokens: usize,
}

/// Layer-1 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexResult {
    pub results: Vec<CompactResult>,
    pub estimated_tokens: usize,
    /// Tokens avoided by returning summaries instead of content.
    pub tokens_saved: usize,
    /// Set when ranking fell back to lexical scoring only.
    pub degraded: bool,
}

/// Position of a timeline entry relative to the target record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelinePosition {
    Before,
    Current,
    After,
}

/// Single entry of a Layer-2 timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub record_id: RecordId,
    pub position: TimelinePosition,
    pub owner_agent_id: AgentId,
    pub created_at: DateTime<Utc>,
    /// Present when summaries were requested.
    pub summary: Option<String>,
    pub estimated_tokens: usize,
}

/// Layer-2 response, ascending creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TimelineResult {
    pub entries: Vec<TimelineEntry>,
    pub estimated_tokens: usize,
    pub tokens_saved: usize,
}

impl TimelineResult {
    /// Entries at the given position.
    pub fn at(&self, position: TimelinePosition) -> impl Iterator<Item = &TimelineEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.position == position)
    }
}

/// Optional metadata returned with full records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    pub sharing_policy: SharingPolicy,
    pub space: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub embedding_model: Option<String>,
}

/// Layer-3 full record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullRecord {
    pub record_id: RecordId,
    pub owner_agent_id: AgentId,
    pub content: String,
    pub summary: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<RecordMetadata>,
    pub estimated_tokens: usize,
}

/// Why a requested id is missing from a batch response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OmitReason {
    /// Absent or not readable by the caller; the two are indistinguishable.
    NotAccessible,
    /// Id repeated in the request.
    Duplicate,
}

/// Requested id omitted from a batch response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Omission {
    pub record_id: RecordId,
    pub reason: OmitReason,
}

/// Layer-3 response, ascending creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchResult {
    pub records: Vec<FullRecord>,
    pub omitted: Vec<Omission>,
    pub estimated_tokens: usize,
}

/// Result of the chained index, timeline, and batch workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExploreResult {
    pub index: IndexResult,
    pub timeline: Option<TimelineResult>,
    pub batch: Option<BatchResult>,
    /// Running total of estimated tokens returned.
    pub total_tokens: usize,
    /// Running total of tokens avoided.
    pub total_tokens_saved: usize,
}
