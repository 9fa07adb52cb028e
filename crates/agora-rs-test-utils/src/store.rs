use agora_rs_memory::{
    InMemoryRecordStore, ListRange, PutOutcome, RecordStore, ScopeFilter, StoreError,
    WriteCondition,
};
use agora_rs_protocol::{MemoryRecord, RecordId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory store whose vector index and backing store can be taken down.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryRecordStore,
    index_down: AtomicBool,
    store_down: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `query_similar` with `IndexUnavailable`.
    pub fn set_index_down(&self, down: bool) {
        self.index_down.store(down, Ordering::SeqCst);
    }

    /// Fail every call with `Unavailable`.
    pub fn set_store_down(&self, down: bool) {
        self.store_down.store(down, Ordering::SeqCst);
    }

    fn check_store(&self) -> Result<(), StoreError> {
        if self.store_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn get(&self, id: RecordId) -> Result<Option<MemoryRecord>, StoreError> {
        self.check_store()?;
        self.inner.get(id).await
    }

    async fn put(
        &self,
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
        condition: WriteCondition,
    ) -> Result<PutOutcome, StoreError> {
        self.check_store()?;
        self.inner.put(record, embedding, condition).await
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        self.check_store()?;
        self.inner.delete(id).await
    }

    async fn query_similar(
        &self,
        embedding: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<(RecordId, f32)>, StoreError> {
        self.check_store()?;
        if self.index_down.load(Ordering::SeqCst) {
            return Err(StoreError::IndexUnavailable("index offline".to_string()));
        }
        self.inner.query_similar(embedding, scope, k).await
    }

    async fn list_by_created_at(
        &self,
        scope: &ScopeFilter,
        range: ListRange,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.check_store()?;
        self.inner.list_by_created_at(scope, range).await
    }

    async fn embedding(&self, id: RecordId) -> Result<Option<Vec<f32>>, StoreError> {
        self.check_store()?;
        if self.index_down.load(Ordering::SeqCst) {
            return Err(StoreError::IndexUnavailable("index offline".to_string()));
        }
        self.inner.embedding(id).await
    }
}
