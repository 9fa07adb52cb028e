//! In-process record table shared by the reference stores.

use crate::error::StoreError;
use crate::store::{CreatedAtCursor, ListRange, PutOutcome, ScopeFilter, SortOrder, WriteCondition};
use crate::text::cosine_similarity;
use agora_rs_protocol::{MemoryRecord, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A record and the vector indexed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub(crate) record: MemoryRecord,
    #[serde(default)]
    pub(crate) embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordTable {
    entries: HashMap<RecordId, StoredEntry>,
}

impl RecordTable {
    pub(crate) fn from_entries(entries: impl IntoIterator<Item = StoredEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.record.id, entry))
                .collect(),
        }
    }

    /// Entries in creation order, for snapshots.
    pub(crate) fn entries(&self) -> Vec<&StoredEntry> {
        let mut entries: Vec<&StoredEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| CreatedAtCursor::of(&entry.record));
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, id: RecordId) -> Option<MemoryRecord> {
        self.entries.get(&id).map(|entry| entry.record.clone())
    }

    pub(crate) fn embedding(&self, id: RecordId) -> Option<Vec<f32>> {
        self.entries.get(&id).and_then(|entry| entry.embedding.clone())
    }

    /// Check the condition and apply the write.
    pub(crate) fn put(
        &mut self,
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
        condition: WriteCondition,
    ) -> Result<PutOutcome, StoreError> {
        let stored = self.entries.get(&record.id);
        match (condition, stored) {
            (WriteCondition::Create, Some(_)) => return Err(StoreError::AlreadyExists(record.id)),
            (WriteCondition::NewerThanStored, None) => return Err(StoreError::NotFound(record.id)),
            (WriteCondition::NewerThanStored, Some(stored))
                if record.updated_at <= stored.record.updated_at =>
            {
                return Ok(PutOutcome::Superseded {
                    current_updated_at: stored.record.updated_at,
                });
            }
            _ => {}
        }
        self.entries
            .insert(record.id, StoredEntry { record, embedding });
        Ok(PutOutcome::Written)
    }

    pub(crate) fn delete(&mut self, id: RecordId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Brute-force cosine ranking over the vectors in scope.
    pub(crate) fn query_similar(
        &self,
        embedding: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Vec<(RecordId, f32)> {
        let mut scored: Vec<(RecordId, f32)> = self
            .entries
            .values()
            .filter(|entry| scope.matches(&entry.record))
            .filter_map(|entry| {
                let vector = entry.embedding.as_ref()?;
                Some((entry.record.id, cosine_similarity(embedding, vector)))
            })
            .collect();
        scored.sort_by(|(left_id, left), (right_id, right)| {
            right.total_cmp(left).then_with(|| left_id.cmp(right_id))
        });
        scored.truncate(k);
        scored
    }

    pub(crate) fn list(&self, scope: &ScopeFilter, range: ListRange) -> Vec<MemoryRecord> {
        let mut records: Vec<&MemoryRecord> = self
            .entries
            .values()
            .map(|entry| &entry.record)
            .filter(|record| scope.matches(record))
            .filter(|record| range.contains(&CreatedAtCursor::of(record)))
            .collect();
        records.sort_by_key(|record| CreatedAtCursor::of(record));
        if range.order == SortOrder::Descending {
            records.reverse();
        }
        let limit = range.limit.unwrap_or(records.len());
        records.into_iter().take(limit).cloned().collect()
    }
}
