use agora_rs_core::content::{content_hash, summarize};
use agora_rs_memory::{EmbeddingProvider, HashingEmbedder, RecordStore, WriteCondition};
use agora_rs_protocol::{AgentId, EmbeddingRef, MemoryRecord, SharingPolicy};
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

/// Fixed instant used as the origin for seeded records.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builds records with explicit timestamps for seeding stores directly.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: MemoryRecord,
}

impl RecordBuilder {
    pub fn new(owner: impl Into<AgentId>, content: &str) -> Self {
        let at = base_time();
        Self {
            record: MemoryRecord {
                id: Uuid::new_v4(),
                owner_agent_id: owner.into(),
                content: content.to_string(),
                summary: summarize(content, 200),
                content_hash: content_hash(content),
                embedding_ref: None,
                category: String::new(),
                space: None,
                sharing_policy: SharingPolicy::Private,
                created_at: at,
                updated_at: at,
                expires_at: None,
            },
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.record.category = category.to_string();
        self
    }

    /// Place the record in a space; space records are category-shared.
    pub fn space(mut self, space: &str) -> Self {
        self.record.space = Some(space.to_string());
        self.record.sharing_policy = SharingPolicy::CategoryShared;
        self
    }

    pub fn policy(mut self, policy: SharingPolicy) -> Self {
        self.record.sharing_policy = policy;
        self
    }

    /// Created and updated `seconds` after [`base_time`].
    pub fn at_offset(mut self, seconds: i64) -> Self {
        let at = base_time() + Duration::seconds(seconds);
        self.record.created_at = at;
        self.record.updated_at = at;
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.record.expires_at = Some(expires_at);
        self
    }

    pub fn build(self) -> MemoryRecord {
        self.record
    }

    /// Embed with `embedder`, store, and return the record.
    pub async fn seed(
        self,
        store: &dyn RecordStore,
        embedder: &HashingEmbedder,
    ) -> MemoryRecord {
        let mut record = self.record;
        let vector = embedder.embed_text(&record.content);
        record.embedding_ref = Some(EmbeddingRef {
            model: embedder.model().to_string(),
            content_hash: record.content_hash.clone(),
        });
        store
            .put(record.clone(), Some(vector), WriteCondition::Create)
            .await
            .expect("seed record");
        record
    }
}
