//! Progressive disclosure search.
//!
//! Three layers trade detail for token cost: an index of summaries, a
//! timeline of neighbours around one record, and full records by id. Every
//! layer only ever returns records the caller may read.

use crate::access::{AccessEvaluator, AccessTarget, ReadCheck};
use crate::error::CoreError;
use crate::tokens::estimate_tokens;
use agora_rs_config::SearchConfig;
use agora_rs_memory::text::{cosine_similarity, lexical_score};
use agora_rs_memory::{
    CreatedAtCursor, EmbeddingProvider, ListRange, RecordStore, ScopeFilter, SortOrder,
};
use agora_rs_protocol::{
    BatchResult, CompactResult, ExploreResult, FullRecord, IndexResult, MemoryRecord, OmitReason,
    Omission, RecordId, RecordMetadata, TimelineEntry, TimelinePosition, TimelineResult,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Filters applied by index search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchOptions {
    /// Skip records whose `expires_at` has passed.
    pub exclude_expired: bool,
    /// Drop results scoring below this value.
    pub min_score: Option<f32>,
}

/// Timeline step of [`SearchEngine::explore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineWindow {
    /// Index into the search results of the record to centre on.
    pub result_index: usize,
    pub before: usize,
    pub after: usize,
    pub include_summaries: bool,
}

/// Parameters for [`SearchEngine::explore`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreOptions {
    pub limit: usize,
    pub search: SearchOptions,
    pub timeline: Option<TimelineWindow>,
    /// Number of top results fetched in full; zero skips the batch step.
    pub fetch: usize,
    pub include_metadata: bool,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            search: SearchOptions::default(),
            timeline: None,
            fetch: 0,
            include_metadata: false,
        }
    }
}

/// Runs the three search layers against a record store.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    access: AccessEvaluator,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        access: AccessEvaluator,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            access,
            config,
        }
    }

    /// Layer 1: summaries of the best matches the agent may read.
    ///
    /// Results are ordered by hybrid score, newest first on ties. Access and
    /// option filters run before truncation, widening the candidate pool
    /// until `limit` results are found or the store runs out. Records scoring
    /// zero are never returned. If the embedder or index fails, ranking falls
    /// back to lexical overlap and the result is marked degraded.
    pub async fn search_index(
        &self,
        query: &str,
        agent_id: &str,
        limit: usize,
        options: SearchOptions,
    ) -> Result<IndexResult, CoreError> {
        if query.trim().is_empty() {
            return Err(CoreError::Validation("query must not be empty".to_string()));
        }
        if limit == 0 {
            return Err(CoreError::Validation("limit must be at least 1".to_string()));
        }

        let ranked = match self.embedder.embed(query).await {
            Ok(embedding) => {
                match self
                    .rank(query, Some(embedding.as_slice()), agent_id, limit, options)
                    .await
                {
                    Err(CoreError::IndexUnavailable(reason)) => {
                        warn!("vector ranking unavailable, using lexical ranking (error={reason})");
                        None
                    }
                    other => Some(other?),
                }
            }
            Err(err) => {
                warn!("query embedding failed, using lexical ranking (error={err})");
                None
            }
        };
        let (ranked, degraded) = match ranked {
            Some(ranked) => (ranked, false),
            None => (
                self.rank(query, None, agent_id, limit, options).await?,
                true,
            ),
        };

        let full_tokens: usize = ranked
            .iter()
            .map(|(record, _)| estimate_tokens(&record.content))
            .sum();
        let results: Vec<CompactResult> = ranked
            .into_iter()
            .map(|(record, score)| CompactResult {
                estimated_tokens: estimate_tokens(&record.summary),
                record_id: record.id,
                summary: record.summary,
                category: record.category,
                owner_agent_id: record.owner_agent_id,
                created_at: record.created_at,
                score,
            })
            .collect();
        let estimated_tokens = results.iter().map(|result| result.estimated_tokens).sum();
        debug!(
            "index search complete (agent_id={}, results={}, degraded={})",
            agent_id,
            results.len(),
            degraded
        );
        Ok(IndexResult {
            results,
            estimated_tokens,
            tokens_saved: full_tokens.saturating_sub(estimated_tokens),
            degraded,
        })
    }

    /// Score readable candidates, widening the pool until `limit` are found.
    async fn rank(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        agent_id: &str,
        limit: usize,
        options: SearchOptions,
    ) -> Result<Vec<(MemoryRecord, f32)>, CoreError> {
        let now = Utc::now();
        let mut reader = self.access.reader(agent_id);
        let mut seen = HashSet::new();
        let mut eligible = Vec::new();
        let mut pool = self.config.candidate_pool.max(limit);
        loop {
            let mut candidates: Vec<(MemoryRecord, f32)> = Vec::new();
            let mut fetched = 0;
            if let Some(embedding) = embedding {
                let hits = self
                    .store
                    .query_similar(embedding, &ScopeFilter::All, pool)
                    .await?;
                fetched = hits.len();
                for (id, similarity) in hits {
                    if !seen.insert(id) {
                        continue;
                    }
                    if let Some(record) = self.store.get(id).await? {
                        candidates.push((record, similarity));
                    }
                }
            }
            let text_hits = self
                .store
                .search_text(query, &ScopeFilter::All, pool)
                .await?;
            fetched = fetched.max(text_hits.len());
            for (record, _) in text_hits {
                if !seen.insert(record.id) {
                    continue;
                }
                let similarity = match embedding {
                    Some(embedding) => self
                        .store
                        .embedding(record.id)
                        .await?
                        .map_or(0.0, |vector| cosine_similarity(embedding, &vector)),
                    None => 0.0,
                };
                candidates.push((record, similarity));
            }

            for (record, similarity) in candidates {
                if options.exclude_expired && record.is_expired(now) {
                    continue;
                }
                if !reader.allows(AccessTarget::from(&record)).await? {
                    continue;
                }
                let score = self.hybrid_score(query, &record, embedding.map(|_| similarity));
                if score <= 0.0 || options.min_score.is_some_and(|min| score < min) {
                    continue;
                }
                eligible.push((record, score));
            }

            if eligible.len() >= limit || fetched < pool {
                break;
            }
            pool = pool.saturating_mul(2);
            debug!("widening search candidate pool (pool={pool}, eligible={})", eligible.len());
        }

        eligible.sort_by(|(left, left_score), (right, right_score)| {
            right_score
                .total_cmp(left_score)
                .then_with(|| right.created_at.cmp(&left.created_at))
        });
        eligible.truncate(limit);
        Ok(eligible)
    }

    /// Weighted blend of vector and lexical relevance, normalized to `[0, 1]`.
    /// Without a vector score only the lexical part counts.
    fn hybrid_score(&self, query: &str, record: &MemoryRecord, similarity: Option<f32>) -> f32 {
        let lexical =
            lexical_score(query, &record.content).max(lexical_score(query, &record.summary));
        let Some(similarity) = similarity else {
            return lexical;
        };
        let total = self.config.vector_weight + self.config.text_weight;
        (self.config.vector_weight * similarity + self.config.text_weight * lexical) / total
    }

    /// Layer 2: the target record with up to `before` older and `after` newer
    /// neighbours, oldest first.
    ///
    /// Neighbours come from the target's space, or from its owner's records
    /// when it has none. Unreadable neighbours are skipped and paging
    /// continues. A missing or unreadable target is denied.
    pub async fn get_timeline(
        &self,
        record_id: RecordId,
        agent_id: &str,
        before: usize,
        after: usize,
        include_summaries: bool,
    ) -> Result<TimelineResult, CoreError> {
        let mut reader = self.access.reader(agent_id);
        let Some(target) = self.store.get(record_id).await? else {
            return Err(CoreError::denied(record_id));
        };
        if !reader.allows(AccessTarget::from(&target)).await? {
            return Err(CoreError::denied(record_id));
        }

        let scope = match &target.space {
            Some(space) => ScopeFilter::Space(space.clone()),
            None => ScopeFilter::Owner(target.owner_agent_id.clone()),
        };
        let cursor = CreatedAtCursor::of(&target);
        let mut older = self
            .collect_neighbours(&scope, cursor, before, SortOrder::Descending, &mut reader)
            .await?;
        older.reverse();
        let newer = self
            .collect_neighbours(&scope, cursor, after, SortOrder::Ascending, &mut reader)
            .await?;

        let mut full_tokens = 0;
        let mut entries = Vec::with_capacity(older.len() + newer.len() + 1);
        let positioned = older
            .into_iter()
            .map(|record| (record, TimelinePosition::Before))
            .chain(std::iter::once((target, TimelinePosition::Current)))
            .chain(newer.into_iter().map(|record| (record, TimelinePosition::After)));
        for (record, position) in positioned {
            full_tokens += estimate_tokens(&record.content);
            entries.push(timeline_entry(record, position, include_summaries));
        }
        let estimated_tokens = entries.iter().map(|entry| entry.estimated_tokens).sum();
        Ok(TimelineResult {
            entries,
            estimated_tokens,
            tokens_saved: full_tokens.saturating_sub(estimated_tokens),
        })
    }

    /// Page away from `cursor` until `wanted` readable records are found.
    async fn collect_neighbours(
        &self,
        scope: &ScopeFilter,
        cursor: CreatedAtCursor,
        wanted: usize,
        order: SortOrder,
        reader: &mut ReadCheck<'_>,
    ) -> Result<Vec<MemoryRecord>, CoreError> {
        let page_size = self.config.timeline_page_size.max(1);
        let mut found = Vec::new();
        let mut cursor = cursor;
        while found.len() < wanted {
            let range = match order {
                SortOrder::Ascending => ListRange::after(cursor, page_size),
                SortOrder::Descending => ListRange::before(cursor, page_size),
            };
            let page = self.store.list_by_created_at(scope, range).await?;
            let exhausted = page.len() < page_size;
            for record in page {
                cursor = CreatedAtCursor::of(&record);
                if found.len() < wanted && reader.allows(AccessTarget::from(&record)).await? {
                    found.push(record);
                }
            }
            if exhausted {
                break;
            }
        }
        Ok(found)
    }

    /// Layer 3: full records for the requested ids, oldest first.
    ///
    /// Missing and unreadable ids are both omitted as `NotAccessible`;
    /// repeated ids are omitted as `Duplicate`.
    pub async fn get_memory_batch(
        &self,
        record_ids: &[RecordId],
        agent_id: &str,
        include_metadata: bool,
    ) -> Result<BatchResult, CoreError> {
        if record_ids.len() > self.config.max_batch_size {
            return Err(CoreError::Validation(format!(
                "batch of {} ids exceeds the maximum of {}",
                record_ids.len(),
                self.config.max_batch_size
            )));
        }
        let mut reader = self.access.reader(agent_id);
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut omitted = Vec::new();
        for &record_id in record_ids {
            if !seen.insert(record_id) {
                omitted.push(Omission {
                    record_id,
                    reason: OmitReason::Duplicate,
                });
                continue;
            }
            let readable = match self.store.get(record_id).await? {
                Some(record) => reader
                    .allows(AccessTarget::from(&record))
                    .await?
                    .then_some(record),
                None => None,
            };
            match readable {
                Some(record) => records.push(record),
                None => omitted.push(Omission {
                    record_id,
                    reason: OmitReason::NotAccessible,
                }),
            }
        }
        records.sort_by_key(CreatedAtCursor::of);
        let records: Vec<FullRecord> = records
            .into_iter()
            .map(|record| full_record(record, include_metadata))
            .collect();
        let estimated_tokens = records.iter().map(|record| record.estimated_tokens).sum();
        debug!(
            "batch fetched (agent_id={}, returned={}, omitted={})",
            agent_id,
            records.len(),
            omitted.len()
        );
        Ok(BatchResult {
            records,
            omitted,
            estimated_tokens,
        })
    }

    /// Index search, then an optional timeline around one result, then an
    /// optional full fetch of the top results, with running token totals.
    pub async fn explore(
        &self,
        query: &str,
        agent_id: &str,
        options: ExploreOptions,
    ) -> Result<ExploreResult, CoreError> {
        let index = self
            .search_index(query, agent_id, options.limit, options.search)
            .await?;
        let mut total_tokens = index.estimated_tokens;
        let mut total_tokens_saved = index.tokens_saved;

        let mut timeline = None;
        if let Some(window) = options.timeline {
            if let Some(centre) = index.results.get(window.result_index) {
                let result = self
                    .get_timeline(
                        centre.record_id,
                        agent_id,
                        window.before,
                        window.after,
                        window.include_summaries,
                    )
                    .await?;
                total_tokens += result.estimated_tokens;
                total_tokens_saved += result.tokens_saved;
                timeline = Some(result);
            }
        }

        let mut batch = None;
        if options.fetch > 0 && !index.results.is_empty() {
            let ids: Vec<RecordId> = index
                .results
                .iter()
                .take(options.fetch)
                .map(|result| result.record_id)
                .collect();
            let result = self
                .get_memory_batch(&ids, agent_id, options.include_metadata)
                .await?;
            total_tokens += result.estimated_tokens;
            batch = Some(result);
        }

        Ok(ExploreResult {
            index,
            timeline,
            batch,
            total_tokens,
            total_tokens_saved,
        })
    }
}

fn header_tokens(record_id: RecordId, owner_agent_id: &str, created_at: DateTime<Utc>) -> usize {
    estimate_tokens(&format!(
        "{record_id} {owner_agent_id} {}",
        created_at.to_rfc3339()
    ))
}

fn timeline_entry(
    record: MemoryRecord,
    position: TimelinePosition,
    include_summary: bool,
) -> TimelineEntry {
    let mut estimated_tokens =
        header_tokens(record.id, &record.owner_agent_id, record.created_at);
    let summary = include_summary.then(|| {
        estimated_tokens += estimate_tokens(&record.summary);
        record.summary
    });
    TimelineEntry {
        record_id: record.id,
        position,
        owner_agent_id: record.owner_agent_id,
        created_at: record.created_at,
        summary,
        estimated_tokens,
    }
}

fn full_record(record: MemoryRecord, include_metadata: bool) -> FullRecord {
    let metadata = include_metadata.then(|| RecordMetadata {
        sharing_policy: record.sharing_policy.clone(),
        space: record.space.clone(),
        expires_at: record.expires_at,
        content_hash: record.content_hash.clone(),
        embedding_model: record
            .embedding_ref
            .as_ref()
            .map(|reference| reference.model.clone()),
    });
    let metadata_tokens = metadata
        .as_ref()
        .and_then(|metadata| serde_json::to_string(metadata).ok())
        .map_or(0, |json| estimate_tokens(&json));
    FullRecord {
        estimated_tokens: estimate_tokens(&record.content) + metadata_tokens,
        record_id: record.id,
        owner_agent_id: record.owner_agent_id,
        content: record.content,
        summary: record.summary,
        category: record.category,
        created_at: record.created_at,
        updated_at: record.updated_at,
        metadata,
    }
}
