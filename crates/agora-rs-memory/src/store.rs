//! Record store abstraction consumed by the core engines.

use crate::error::StoreError;
use crate::text::lexical_score;
use agora_rs_protocol::{AgentId, MemoryRecord, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Precondition checked atomically by [`RecordStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// The id must not be stored yet.
    Create,
    /// The record must exist and the incoming `updated_at` must be strictly
    /// newer than the stored one (last-write-wins).
    NewerThanStored,
}

/// Result of a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record and its vector were committed.
    Written,
    /// A newer or equally recent write is already stored; nothing changed.
    Superseded { current_updated_at: DateTime<Utc> },
}

/// Subset of records a query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ScopeFilter {
    /// Every stored record.
    All,
    /// Records owned by the agent.
    Owner(AgentId),
    /// Records in the category, outside any shared space.
    Category(String),
    /// Records created in the shared space.
    Space(String),
}

impl ScopeFilter {
    /// Whether the record falls inside this scope.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Owner(owner) => record.owner_agent_id == *owner,
            ScopeFilter::Category(category) => {
                record.space.is_none() && record.category == *category
            }
            ScopeFilter::Space(space) => record.space.as_deref() == Some(space.as_str()),
        }
    }
}

/// Position in creation order; ties on `created_at` are broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreatedAtCursor {
    pub created_at: DateTime<Utc>,
    pub id: RecordId,
}

impl CreatedAtCursor {
    /// Cursor positioned exactly at the record.
    pub fn of(record: &MemoryRecord) -> Self {
        Self {
            created_at: record.created_at,
            id: record.id,
        }
    }
}

/// Direction of a creation-order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Window over creation order. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListRange {
    pub after: Option<CreatedAtCursor>,
    pub before: Option<CreatedAtCursor>,
    /// Maximum records returned; `None` for no limit.
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl ListRange {
    /// Everything, oldest first.
    pub fn all() -> Self {
        Self::default()
    }

    /// Up to `limit` records created after the cursor, oldest first.
    pub fn after(cursor: CreatedAtCursor, limit: usize) -> Self {
        Self {
            after: Some(cursor),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Up to `limit` records created before the cursor, newest first.
    pub fn before(cursor: CreatedAtCursor, limit: usize) -> Self {
        Self {
            before: Some(cursor),
            limit: Some(limit),
            order: SortOrder::Descending,
            ..Self::default()
        }
    }

    /// Whether the cursor lies strictly inside both bounds.
    pub fn contains(&self, cursor: &CreatedAtCursor) -> bool {
        self.after.is_none_or(|after| *cursor > after)
            && self.before.is_none_or(|before| *cursor < before)
    }
}

#[async_trait]
/// Persistent record storage with an attached vector index.
///
/// Implementations must give read-after-write consistency for a caller's own
/// writes and apply [`WriteCondition`] atomically with the write.
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id.
    async fn get(&self, id: RecordId) -> Result<Option<MemoryRecord>, StoreError>;

    /// Persist a record together with its vector, subject to `condition`.
    ///
    /// A `None` embedding removes any vector held for the record.
    async fn put(
        &self,
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
        condition: WriteCondition,
    ) -> Result<PutOutcome, StoreError>;

    /// Remove a record and its vector; returns whether it existed.
    async fn delete(&self, id: RecordId) -> Result<bool, StoreError>;

    /// Top `k` records in scope by cosine similarity, best first.
    async fn query_similar(
        &self,
        embedding: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<(RecordId, f32)>, StoreError>;

    /// Records in scope ordered by `(created_at, id)`.
    async fn list_by_created_at(
        &self,
        scope: &ScopeFilter,
        range: ListRange,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Vector stored for the record, if any.
    async fn embedding(&self, id: RecordId) -> Result<Option<Vec<f32>>, StoreError>;

    /// Oldest record owned by `owner` whose content hash equals `content_hash`.
    async fn find_by_content_hash(
        &self,
        owner: &str,
        content_hash: &str,
    ) -> Result<Option<MemoryRecord>, StoreError> {
        let owned = self
            .list_by_created_at(&ScopeFilter::Owner(owner.to_string()), ListRange::all())
            .await?;
        Ok(owned
            .into_iter()
            .find(|record| record.content_hash == content_hash))
    }

    /// Top `k` records in scope by lexical overlap with the query, best first.
    ///
    /// The default scans the scope in creation order; stores with a text
    /// index should override it.
    async fn search_text(
        &self,
        query: &str,
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
        let records = self.list_by_created_at(scope, ListRange::all()).await?;
        let mut scored: Vec<(MemoryRecord, f32)> = records
            .into_iter()
            .filter_map(|record| {
                let score = lexical_score(query, &record.content)
                    .max(lexical_score(query, &record.summary));
                (score > 0.0).then_some((record, score))
            })
            .collect();
        scored.sort_by(|(left, left_score), (right, right_score)| {
            right_score
                .total_cmp(left_score)
                .then_with(|| right.created_at.cmp(&left.created_at))
        });
        scored.truncate(k);
        Ok(scored)
    }
}
