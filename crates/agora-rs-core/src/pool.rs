//! Shared memory pool: the write and read paths over the core engines.
//!
//! A write is a two-step protocol. The caller asks for a [`DuplicateVerdict`]
//! with [`MemoryPool::evaluate`] and then commits an explicit [`WritePlan`].
//! Every committed transition emits exactly one [`SyncEvent`] on the bus and
//! one audit record.

use crate::access::{AccessEvaluator, AccessTarget};
use crate::bus::{EventCallback, PublishAck, SyncBus};
use crate::content::{content_hash, normalize_content, summarize};
use crate::dedup::DedupEngine;
use crate::error::CoreError;
use crate::search::{ExploreOptions, SearchEngine, SearchOptions};
use agora_rs_config::AgoraConfig;
use agora_rs_memory::{
    AuditSink, EmbeddingProvider, HashingEmbedder, InMemoryMembership, MembershipSource,
    NoopAuditSink, PutOutcome, RecordStore, WriteCondition,
};
use agora_rs_protocol::{
    AgentId, BatchResult, Capability, ChannelScope, DuplicateVerdict, EmbeddingRef, ExploreResult,
    IndexResult, MembershipScope, MemoryRecord, RecommendedAction, RecordId, SharingPolicy,
    SubscriptionHandle, SyncEvent, SyncEventType, TimelineResult,
};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Attempts made by a sharing change racing concurrent writes.
const SHARING_CHANGE_ATTEMPTS: usize = 3;

/// New content to add to the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub owner_agent_id: AgentId,
    pub content: String,
    pub category: String,
    /// Shared space to create the record in; forces category sharing.
    pub space: Option<String>,
    pub sharing_policy: SharingPolicy,
    pub expires_at: Option<DateTime<Utc>>,
}

impl WriteRequest {
    /// Private, uncategorized content owned by `owner_agent_id`.
    pub fn new(owner_agent_id: impl Into<AgentId>, content: impl Into<String>) -> Self {
        Self {
            owner_agent_id: owner_agent_id.into(),
            content: content.into(),
            category: String::new(),
            space: None,
            sharing_policy: SharingPolicy::Private,
            expires_at: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn sharing(mut self, sharing_policy: SharingPolicy) -> Self {
        self.sharing_policy = sharing_policy;
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// What the caller chose to do after a duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// Persist as a new record.
    Store,
    /// Write nothing.
    Skip,
    /// Append the content to an existing record.
    MergeInto(RecordId),
}

impl WritePlan {
    /// The plan a verdict recommends.
    pub fn from_verdict(verdict: &DuplicateVerdict) -> Self {
        match (verdict.recommended_action, verdict.matched_record_id) {
            (RecommendedAction::Skip, _) => WritePlan::Skip,
            (RecommendedAction::Merge, Some(matched)) => WritePlan::MergeInto(matched),
            _ => WritePlan::Store,
        }
    }
}

/// Result of an update under last-write-wins.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was committed.
    Applied(MemoryRecord),
    /// A write at least as recent was already stored; nothing changed.
    Superseded { current_updated_at: DateTime<Utc> },
}

/// Result of [`MemoryPool::write`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Stored(MemoryRecord),
    Skipped,
    Merged(UpdateOutcome),
}

/// Builder for [`MemoryPool`].
pub struct MemoryPoolBuilder {
    store: Arc<dyn RecordStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    membership: Option<Arc<dyn MembershipSource>>,
    audit: Option<Arc<dyn AuditSink>>,
    config: AgoraConfig,
}

impl MemoryPoolBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn membership(mut self, membership: Arc<dyn MembershipSource>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(mut self, config: AgoraConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the config and assemble the pool.
    ///
    /// Unset collaborators default to the hashing embedder described by the
    /// config, an empty membership directory, and a discarding audit sink.
    pub fn build(self) -> Result<MemoryPool, CoreError> {
        self.config.validate()?;
        let config = self.config;
        let embedder = self.embedder.unwrap_or_else(|| {
            Arc::new(HashingEmbedder::new(
                config.embedding.model.clone(),
                config.embedding.dimensions,
            ))
        });
        let membership = self
            .membership
            .unwrap_or_else(|| Arc::new(InMemoryMembership::new()));
        let audit = self.audit.unwrap_or_else(|| Arc::new(NoopAuditSink));
        let access = AccessEvaluator::new(membership);
        let dedup = DedupEngine::new(self.store.clone(), embedder.clone(), config.dedup.clone());
        let search = SearchEngine::new(
            self.store.clone(),
            embedder.clone(),
            access.clone(),
            config.search.clone(),
        );
        let bus = SyncBus::new(access.clone(), config.bus.clone());
        info!(
            "memory pool ready (embedding_model={}, near_threshold={}, related_threshold={})",
            embedder.model(),
            config.dedup.near_threshold,
            config.dedup.related_threshold
        );
        Ok(MemoryPool {
            store: self.store,
            embedder,
            access,
            dedup,
            search,
            bus,
            audit,
            config,
        })
    }
}

/// Entry point for agents sharing a memory pool.
#[derive(Clone)]
pub struct MemoryPool {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    access: AccessEvaluator,
    dedup: DedupEngine,
    search: SearchEngine,
    bus: SyncBus,
    audit: Arc<dyn AuditSink>,
    config: AgoraConfig,
}

impl MemoryPool {
    /// Start building a pool over the given store.
    pub fn builder(store: Arc<dyn RecordStore>) -> MemoryPoolBuilder {
        MemoryPoolBuilder {
            store,
            embedder: None,
            membership: None,
            audit: None,
            config: AgoraConfig::default(),
        }
    }

    pub fn config(&self) -> &AgoraConfig {
        &self.config
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    /// Duplicate check for content the agent is about to write.
    pub async fn evaluate(
        &self,
        content: &str,
        owner_agent_id: &str,
    ) -> Result<DuplicateVerdict, CoreError> {
        self.dedup.evaluate(content, owner_agent_id).await
    }

    /// Redundancy report over everything the agent owns. Only the owner may
    /// ask, since verdicts name the records involved.
    pub async fn compact(&self, owner_agent_id: &str) -> Result<Vec<DuplicateVerdict>, CoreError> {
        let verdicts = self.dedup.evaluate_and_compact(owner_agent_id).await?;
        self.audit.record(
            "memory.compact_evaluated",
            json!({ "agent_id": owner_agent_id, "verdicts": verdicts.len() }),
        );
        Ok(verdicts)
    }

    /// Commit a write according to `plan`.
    pub async fn write(
        &self,
        request: WriteRequest,
        plan: WritePlan,
    ) -> Result<WriteOutcome, CoreError> {
        if normalize_content(&request.content).is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }
        match plan {
            WritePlan::Skip => {
                self.audit.record(
                    "memory.write_skipped",
                    json!({ "agent_id": request.owner_agent_id }),
                );
                Ok(WriteOutcome::Skipped)
            }
            WritePlan::Store => self.create(request).await.map(WriteOutcome::Stored),
            WritePlan::MergeInto(target) => {
                let existing = self
                    .load_authorized(target, &request.owner_agent_id, Capability::Write)
                    .await?;
                let merged = format!("{}\n{}", existing.content, request.content);
                let outcome = self
                    .update_content(target, &request.owner_agent_id, &merged, Utc::now())
                    .await?;
                Ok(WriteOutcome::Merged(outcome))
            }
        }
    }

    /// Evaluate, then follow the verdict's recommendation.
    pub async fn write_deduplicated(
        &self,
        request: WriteRequest,
    ) -> Result<(DuplicateVerdict, WriteOutcome), CoreError> {
        let verdict = self
            .evaluate(&request.content, &request.owner_agent_id)
            .await?;
        let outcome = self.write(request, WritePlan::from_verdict(&verdict)).await?;
        Ok((verdict, outcome))
    }

    async fn create(&self, request: WriteRequest) -> Result<MemoryRecord, CoreError> {
        let WriteRequest {
            owner_agent_id,
            content,
            category,
            space,
            sharing_policy,
            expires_at,
        } = request;

        let sharing_policy = match &space {
            Some(space) => {
                let scope = MembershipScope::Space(space.clone());
                if !self.access.is_member(&owner_agent_id, &scope).await? {
                    return Err(CoreError::AuthorizationDenied {
                        resource: scope.to_string(),
                    });
                }
                SharingPolicy::CategoryShared
            }
            None => sharing_policy.normalized(),
        };

        let now = Utc::now();
        let mut record = MemoryRecord {
            id: Uuid::new_v4(),
            owner_agent_id,
            content,
            summary: String::new(),
            content_hash: String::new(),
            embedding_ref: None,
            category,
            space,
            sharing_policy,
            created_at: now,
            updated_at: now,
            expires_at,
        };
        let embedding = self.refresh_derived(&mut record).await;
        self.store
            .put(record.clone(), embedding, WriteCondition::Create)
            .await?;
        info!(
            "memory record stored (id={}, owner={}, policy={})",
            record.id,
            record.owner_agent_id,
            record.sharing_policy.label()
        );
        self.audit.record(
            "memory.created",
            json!({
                "record_id": record.id,
                "agent_id": record.owner_agent_id,
                "policy": record.sharing_policy.label(),
            }),
        );
        self.announce(SyncEventType::Created, &record, &record.owner_agent_id, json!({}))
            .await;
        Ok(record)
    }

    /// Replace a record's content under last-write-wins.
    ///
    /// `source_timestamp` becomes the record's `updated_at`; an update that
    /// is not strictly newer than the stored one is superseded and emits no
    /// event.
    pub async fn update_content(
        &self,
        record_id: RecordId,
        agent_id: &str,
        content: &str,
        source_timestamp: DateTime<Utc>,
    ) -> Result<UpdateOutcome, CoreError> {
        if normalize_content(content).is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }
        let mut record = self
            .load_authorized(record_id, agent_id, Capability::Write)
            .await?;
        record.content = content.to_string();
        record.updated_at = source_timestamp;
        let embedding = self.refresh_derived(&mut record).await;

        let outcome = self
            .store
            .put(record.clone(), embedding, WriteCondition::NewerThanStored)
            .await
            .map_err(|err| CoreError::from(err).masked())?;
        match outcome {
            PutOutcome::Written => {
                self.audit.record(
                    "memory.updated",
                    json!({ "record_id": record_id, "agent_id": agent_id }),
                );
                self.announce(SyncEventType::Updated, &record, agent_id, json!({}))
                    .await;
                Ok(UpdateOutcome::Applied(record))
            }
            PutOutcome::Superseded { current_updated_at } => {
                info!(
                    "update superseded (id={}, source_timestamp={}, stored_updated_at={})",
                    record_id, source_timestamp, current_updated_at
                );
                self.audit.record(
                    "memory.update_superseded",
                    json!({ "record_id": record_id, "agent_id": agent_id }),
                );
                Ok(UpdateOutcome::Superseded { current_updated_at })
            }
        }
    }

    /// Change who may read a record. Only the owner may do this; records in a
    /// shared space stay category-shared.
    pub async fn change_sharing(
        &self,
        record_id: RecordId,
        agent_id: &str,
        sharing_policy: SharingPolicy,
    ) -> Result<MemoryRecord, CoreError> {
        let sharing_policy = sharing_policy.normalized();
        for _ in 0..SHARING_CHANGE_ATTEMPTS {
            let mut record = self
                .load_authorized(record_id, agent_id, Capability::Write)
                .await?;
            if record.space.is_some() && sharing_policy != SharingPolicy::CategoryShared {
                return Err(CoreError::Validation(
                    "records in a shared space must stay category-shared".to_string(),
                ));
            }
            let previous = record.sharing_policy.label();
            record.sharing_policy = sharing_policy.clone();
            record.updated_at = Utc::now().max(record.updated_at + Duration::milliseconds(1));
            let embedding = self.store.embedding(record_id).await.unwrap_or_else(|err| {
                warn!("could not read stored vector, dropping it (id={record_id}, error={err})");
                None
            });
            if embedding.is_none() {
                record.embedding_ref = None;
            }
            let outcome = self
                .store
                .put(record.clone(), embedding, WriteCondition::NewerThanStored)
                .await
                .map_err(|err| CoreError::from(err).masked())?;
            if outcome == PutOutcome::Written {
                self.audit.record(
                    "memory.sharing_changed",
                    json!({
                        "record_id": record_id,
                        "agent_id": agent_id,
                        "previous": previous,
                        "policy": record.sharing_policy.label(),
                    }),
                );
                self.announce(
                    SyncEventType::SharingChanged,
                    &record,
                    agent_id,
                    json!({ "previous_policy": previous }),
                )
                .await;
                return Ok(record);
            }
        }
        Err(CoreError::StoreUnavailable(format!(
            "record {record_id} kept changing while its sharing was updated"
        )))
    }

    /// Delete a record. Only the owner may do this.
    pub async fn delete(&self, record_id: RecordId, agent_id: &str) -> Result<(), CoreError> {
        let record = self
            .load_authorized(record_id, agent_id, Capability::Delete)
            .await?;
        if !self.store.delete(record_id).await? {
            return Err(CoreError::denied(record_id));
        }
        info!("memory record deleted (id={record_id}, agent_id={agent_id})");
        self.audit.record(
            "memory.deleted",
            json!({ "record_id": record_id, "agent_id": agent_id }),
        );
        self.announce(SyncEventType::Deleted, &record, agent_id, json!({}))
            .await;
        Ok(())
    }

    /// Read a record the agent has access to.
    pub async fn get(
        &self,
        record_id: RecordId,
        agent_id: &str,
    ) -> Result<MemoryRecord, CoreError> {
        let record = self
            .load_authorized(record_id, agent_id, Capability::Read)
            .await?;
        self.audit.record(
            "memory.read",
            json!({ "record_id": record_id, "agent_id": agent_id }),
        );
        Ok(record)
    }

    /// Layer-1 search; see [`SearchEngine::search_index`].
    pub async fn search_index(
        &self,
        query: &str,
        agent_id: &str,
        limit: usize,
        options: SearchOptions,
    ) -> Result<IndexResult, CoreError> {
        let result = self
            .search
            .search_index(query, agent_id, limit, options)
            .await?;
        self.audit.record(
            "memory.search_index",
            json!({
                "agent_id": agent_id,
                "results": result.results.len(),
                "degraded": result.degraded,
            }),
        );
        Ok(result)
    }

    /// Layer-2 timeline; see [`SearchEngine::get_timeline`].
    pub async fn get_timeline(
        &self,
        record_id: RecordId,
        agent_id: &str,
        before: usize,
        after: usize,
        include_summaries: bool,
    ) -> Result<TimelineResult, CoreError> {
        let result = self
            .search
            .get_timeline(record_id, agent_id, before, after, include_summaries)
            .await?;
        self.audit.record(
            "memory.timeline",
            json!({
                "record_id": record_id,
                "agent_id": agent_id,
                "entries": result.entries.len(),
            }),
        );
        Ok(result)
    }

    /// Layer-3 batch fetch; see [`SearchEngine::get_memory_batch`].
    pub async fn get_memory_batch(
        &self,
        record_ids: &[RecordId],
        agent_id: &str,
        include_metadata: bool,
    ) -> Result<BatchResult, CoreError> {
        let result = self
            .search
            .get_memory_batch(record_ids, agent_id, include_metadata)
            .await?;
        self.audit.record(
            "memory.batch",
            json!({
                "agent_id": agent_id,
                "returned": result.records.len(),
                "omitted": result.omitted.len(),
            }),
        );
        Ok(result)
    }

    /// Chained search workflow; see [`SearchEngine::explore`].
    pub async fn explore(
        &self,
        query: &str,
        agent_id: &str,
        options: ExploreOptions,
    ) -> Result<ExploreResult, CoreError> {
        let result = self.search.explore(query, agent_id, options).await?;
        self.audit.record(
            "memory.explore",
            json!({ "agent_id": agent_id, "total_tokens": result.total_tokens }),
        );
        Ok(result)
    }

    /// Subscribe to record events.
    ///
    /// Category and space channels require membership; a record channel
    /// requires read access to the record.
    pub async fn subscribe(
        &self,
        agent_id: &str,
        scope: ChannelScope,
        callback: Arc<dyn EventCallback>,
    ) -> Result<SubscriptionHandle, CoreError> {
        let membership = match &scope {
            ChannelScope::Owned => None,
            ChannelScope::Category(category) => Some(MembershipScope::Category(category.clone())),
            ChannelScope::Space(space) => Some(MembershipScope::Space(space.clone())),
            ChannelScope::Record(record_id) => {
                self.load_authorized(*record_id, agent_id, Capability::Read)
                    .await?;
                None
            }
        };
        if let Some(membership) = membership {
            if !self.access.is_member(agent_id, &membership).await? {
                return Err(CoreError::AuthorizationDenied {
                    resource: membership.to_string(),
                });
            }
        }
        let handle = self.bus.subscribe(agent_id, scope, callback);
        self.audit.record(
            "memory.subscribed",
            json!({ "agent_id": agent_id, "subscription_id": handle.id }),
        );
        Ok(handle)
    }

    /// Cancel a subscription made by the same agent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.bus.unsubscribe(handle);
        if removed {
            self.audit.record(
                "memory.unsubscribed",
                json!({ "agent_id": handle.agent_id, "subscription_id": handle.id }),
            );
        }
        removed
    }

    /// Fetch a record and check the capability. Missing and forbidden
    /// records produce the same error.
    async fn load_authorized(
        &self,
        record_id: RecordId,
        agent_id: &str,
        capability: Capability,
    ) -> Result<MemoryRecord, CoreError> {
        let record = self
            .store
            .get(record_id)
            .await?
            .ok_or(CoreError::NotFound(record_id))
            .map_err(CoreError::masked)?;
        let decision = self
            .access
            .can_access(AccessTarget::from(&record), agent_id, capability)
            .await?;
        if !decision.allowed {
            self.audit.record(
                "memory.access_denied",
                json!({
                    "record_id": record_id,
                    "agent_id": agent_id,
                    "capability": capability,
                    "reason": decision.reason,
                }),
            );
            return Err(CoreError::denied(record_id));
        }
        Ok(record)
    }

    /// Recompute summary, hash, and vector from the record's content.
    ///
    /// An embedding failure leaves the record without a vector; the write
    /// still goes ahead.
    async fn refresh_derived(&self, record: &mut MemoryRecord) -> Option<Vec<f32>> {
        let normalized = normalize_content(&record.content);
        record.summary = summarize(&record.content, self.config.summary.max_chars);
        record.content_hash = content_hash(&normalized);
        match self.embedder.embed(&normalized).await {
            Ok(embedding) => {
                record.embedding_ref = Some(EmbeddingRef {
                    model: self.embedder.model().to_string(),
                    content_hash: record.content_hash.clone(),
                });
                Some(embedding)
            }
            Err(err) => {
                warn!(
                    "embedding failed, storing record without a vector (id={}, error={err})",
                    record.id
                );
                record.embedding_ref = None;
                None
            }
        }
    }

    /// Publish a transition. The write is already committed, so fan-out
    /// problems are logged by the bus rather than returned.
    async fn announce(
        &self,
        event_type: SyncEventType,
        record: &MemoryRecord,
        agent_id: &str,
        mut payload: serde_json::Value,
    ) -> PublishAck {
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("summary".to_string(), json!(record.summary));
        }
        let event = SyncEvent::for_record(event_type, record, agent_id, payload);
        self.bus.publish(event).await
    }
}
