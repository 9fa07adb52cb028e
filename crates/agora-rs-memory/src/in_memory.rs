//! Process-local record store with a brute-force vector index.

use crate::error::StoreError;
use crate::store::{ListRange, PutOutcome, RecordStore, ScopeFilter, WriteCondition};
use crate::table::RecordTable;
use agora_rs_protocol::{MemoryRecord, RecordId};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

/// Record store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: RecordId) -> Result<Option<MemoryRecord>, StoreError> {
        Ok(self.table.read().get(id))
    }

    async fn put(
        &self,
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
        condition: WriteCondition,
    ) -> Result<PutOutcome, StoreError> {
        let id = record.id;
        let outcome = self.table.write().put(record, embedding, condition)?;
        debug!("put record (id={}, outcome={:?})", id, outcome);
        Ok(outcome)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.table.write().delete(id))
    }

    async fn query_similar(
        &self,
        embedding: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<(RecordId, f32)>, StoreError> {
        Ok(self.table.read().query_similar(embedding, scope, k))
    }

    async fn list_by_created_at(
        &self,
        scope: &ScopeFilter,
        range: ListRange,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        Ok(self.table.read().list(scope, range))
    }

    async fn embedding(&self, id: RecordId) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self.table.read().embedding(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CreatedAtCursor;
    use agora_rs_protocol::SharingPolicy;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn record(owner: &str, content: &str, offset_secs: i64) -> MemoryRecord {
        let created_at = Utc::now() + Duration::seconds(offset_secs);
        MemoryRecord {
            id: Uuid::new_v4(),
            owner_agent_id: owner.to_string(),
            content: content.to_string(),
            summary: content.to_string(),
            content_hash: content.to_string(),
            embedding_ref: None,
            category: String::new(),
            space: None,
            sharing_policy: SharingPolicy::Private,
            created_at,
            updated_at: created_at,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_existing_id() {
        let store = InMemoryRecordStore::new();
        let rec = record("a", "one", 0);
        store
            .put(rec.clone(), None, WriteCondition::Create)
            .await
            .expect("create");
        let err = store
            .put(rec, None, WriteCondition::Create)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn newer_than_stored_supersedes_older_and_equal_writes() {
        let store = InMemoryRecordStore::new();
        let rec = record("a", "one", 0);
        store
            .put(rec.clone(), None, WriteCondition::Create)
            .await
            .expect("create");

        let same_time = MemoryRecord {
            content: "two".to_string(),
            ..rec.clone()
        };
        let outcome = store
            .put(same_time, None, WriteCondition::NewerThanStored)
            .await
            .expect("put");
        assert_eq!(
            outcome,
            PutOutcome::Superseded {
                current_updated_at: rec.updated_at
            }
        );

        let newer = MemoryRecord {
            content: "three".to_string(),
            updated_at: rec.updated_at + Duration::milliseconds(1),
            ..rec.clone()
        };
        let outcome = store
            .put(newer, None, WriteCondition::NewerThanStored)
            .await
            .expect("put");
        assert_eq!(outcome, PutOutcome::Written);
        let stored = store.get(rec.id).await.expect("get").expect("present");
        assert_eq!(stored.content, "three");
    }

    #[tokio::test]
    async fn conditional_update_of_missing_record_fails() {
        let store = InMemoryRecordStore::new();
        let err = store
            .put(record("a", "one", 0), None, WriteCondition::NewerThanStored)
            .await
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_similar_respects_scope_and_skips_unindexed() {
        let store = InMemoryRecordStore::new();
        let mine = record("a", "mine", 0);
        let theirs = record("b", "theirs", 1);
        let unindexed = record("a", "unindexed", 2);
        store
            .put(mine.clone(), Some(vec![1.0, 0.0]), WriteCondition::Create)
            .await
            .expect("put");
        store
            .put(theirs, Some(vec![1.0, 0.0]), WriteCondition::Create)
            .await
            .expect("put");
        store
            .put(unindexed, None, WriteCondition::Create)
            .await
            .expect("put");

        let hits = store
            .query_similar(&[1.0, 0.0], &ScopeFilter::Owner("a".to_string()), 10)
            .await
            .expect("query");
        assert_eq!(hits, vec![(mine.id, 1.0)]);
    }

    #[tokio::test]
    async fn lists_pages_in_both_directions() {
        let store = InMemoryRecordStore::new();
        let records: Vec<MemoryRecord> = (0..5).map(|i| record("a", "x", i)).collect();
        for rec in records.iter().rev() {
            store
                .put(rec.clone(), None, WriteCondition::Create)
                .await
                .expect("put");
        }
        let scope = ScopeFilter::Owner("a".to_string());
        let pivot = CreatedAtCursor::of(&records[2]);

        let after = store
            .list_by_created_at(&scope, ListRange::after(pivot, 5))
            .await
            .expect("list");
        let after_ids: Vec<_> = after.iter().map(|rec| rec.id).collect();
        assert_eq!(after_ids, vec![records[3].id, records[4].id]);

        let before = store
            .list_by_created_at(&scope, ListRange::before(pivot, 1))
            .await
            .expect("list");
        let before_ids: Vec<_> = before.iter().map(|rec| rec.id).collect();
        assert_eq!(before_ids, vec![records[1].id]);
    }

    #[tokio::test]
    async fn default_text_search_ranks_by_overlap() {
        let store = InMemoryRecordStore::new();
        let both = record("a", "AAPL price rose", 0);
        let one = record("a", "AAPL volume", 1);
        let none = record("a", "TSLA volume", 2);
        for rec in [&both, &one, &none] {
            store
                .put(rec.clone(), None, WriteCondition::Create)
                .await
                .expect("put");
        }
        let hits = store
            .search_text("aapl price", &ScopeFilter::All, 10)
            .await
            .expect("search");
        let ids: Vec<_> = hits.iter().map(|(rec, _)| rec.id).collect();
        assert_eq!(ids, vec![both.id, one.id]);
    }
}
