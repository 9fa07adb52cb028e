//! Duplicate detection for candidate writes and stored records.

use crate::content::{content_hash, normalize_content};
use crate::error::CoreError;
use agora_rs_config::DedupConfig;
use agora_rs_memory::text::cosine_similarity;
use agora_rs_memory::{EmbeddingProvider, ListRange, RecordStore, ScopeFilter, StoreError};
use agora_rs_protocol::{DuplicateKind, DuplicateVerdict, MemoryRecord, RecommendedAction, RecordId};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Classifies content as exact, near, related, or distinct relative to the
/// records an agent already owns. Never writes.
#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: DedupConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Classify a candidate against the owner's records.
    ///
    /// An exact match (same normalized content, same owner) short-circuits.
    /// Otherwise the best vector neighbour decides. When the embedder or
    /// index is down the verdict is `Distinct` with `degraded` set; store
    /// failures during the exact check are returned.
    pub async fn evaluate(
        &self,
        candidate: &str,
        owner_agent_id: &str,
    ) -> Result<DuplicateVerdict, CoreError> {
        let normalized = normalize_content(candidate);
        if normalized.is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }

        let hash = content_hash(&normalized);
        if let Some(existing) = self
            .store
            .find_by_content_hash(owner_agent_id, &hash)
            .await
            .map_err(store_unavailable)?
        {
            debug!(
                "exact duplicate found (owner={}, matched={})",
                owner_agent_id, existing.id
            );
            return Ok(DuplicateVerdict::exact(existing.id));
        }

        let embedding = match self.embedder.embed(&normalized).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(
                    "embedding failed, using exact check only (owner={owner_agent_id}, error={err})"
                );
                return Ok(DuplicateVerdict::distinct(0.0, None, true));
            }
        };
        let scope = ScopeFilter::Owner(owner_agent_id.to_string());
        let neighbours = match self
            .store
            .query_similar(&embedding, &scope, self.config.neighbors)
            .await
        {
            Ok(neighbours) => neighbours,
            Err(err) if err.is_index_failure() => {
                warn!(
                    "vector index unavailable, using exact check only \
                     (owner={owner_agent_id}, error={err})"
                );
                return Ok(DuplicateVerdict::distinct(0.0, None, true));
            }
            Err(err) => return Err(store_unavailable(err)),
        };

        let verdict = match neighbours.first() {
            Some((matched, score)) => self.classify(*score, *matched),
            None => DuplicateVerdict::distinct(0.0, None, false),
        };
        debug!(
            "candidate classified (owner={}, kind={:?}, score={:.3})",
            owner_agent_id, verdict.kind, verdict.score
        );
        Ok(verdict)
    }

    /// Verdict for a similarity score against the configured thresholds.
    pub fn classify(&self, score: f32, matched_record_id: RecordId) -> DuplicateVerdict {
        let score = score.clamp(0.0, 1.0);
        let (kind, recommended_action) = if score >= self.config.near_threshold {
            (DuplicateKind::Near, RecommendedAction::Merge)
        } else if score >= self.config.related_threshold {
            (DuplicateKind::Related, RecommendedAction::KeepBoth)
        } else {
            (DuplicateKind::Distinct, RecommendedAction::KeepBoth)
        };
        DuplicateVerdict {
            kind,
            score,
            matched_record_id: Some(matched_record_id),
            recommended_action,
            subject_record_id: None,
            degraded: false,
        }
    }

    /// Find redundant records among everything the owner has stored.
    ///
    /// Each extra copy in an exact group yields an `Exact/Skip` verdict
    /// against the oldest copy. Each near pair yields one `Near/Merge`
    /// verdict whose subject is the newer record. Small collections are
    /// compared pairwise; larger ones use one index query per record. If the
    /// index is down only exact groups are reported, all flagged degraded.
    pub async fn evaluate_and_compact(
        &self,
        owner_agent_id: &str,
    ) -> Result<Vec<DuplicateVerdict>, CoreError> {
        let scope = ScopeFilter::Owner(owner_agent_id.to_string());
        let records = self
            .store
            .list_by_created_at(&scope, ListRange::all())
            .await
            .map_err(store_unavailable)?;

        let mut verdicts = Vec::new();
        let mut oldest_by_hash: HashMap<&str, RecordId> = HashMap::new();
        let mut survivors: Vec<&MemoryRecord> = Vec::new();
        for record in &records {
            match oldest_by_hash.get(record.content_hash.as_str()) {
                Some(oldest) => {
                    verdicts.push(DuplicateVerdict::exact(*oldest).with_subject(record.id));
                }
                None => {
                    oldest_by_hash.insert(&record.content_hash, record.id);
                    survivors.push(record);
                }
            }
        }

        let near = if survivors.len() <= self.config.pairwise_limit {
            self.near_pairs_pairwise(&survivors).await
        } else {
            let copies = records.len() - survivors.len();
            self.near_pairs_indexed(&survivors, copies, &scope).await
        };
        match near {
            Ok(pairs) => verdicts.extend(pairs),
            Err(err) if err.is_index_failure() => {
                warn!(
                    "vector index unavailable, compaction limited to exact duplicates \
                     (owner={owner_agent_id}, error={err})"
                );
                verdicts.iter_mut().for_each(|verdict| verdict.degraded = true);
            }
            Err(err) => return Err(store_unavailable(err)),
        }

        info!(
            "compaction evaluated (owner={}, records={}, verdicts={})",
            owner_agent_id,
            records.len(),
            verdicts.len()
        );
        Ok(verdicts)
    }

    /// All-pairs cosine over stored vectors. `records` is in creation order.
    async fn near_pairs_pairwise(
        &self,
        records: &[&MemoryRecord],
    ) -> Result<Vec<DuplicateVerdict>, StoreError> {
        let mut vectors = Vec::with_capacity(records.len());
        for record in records {
            if let Some(vector) = self.store.embedding(record.id).await? {
                vectors.push((*record, vector));
            }
        }
        let mut verdicts = Vec::new();
        for (newer_index, (newer, newer_vector)) in vectors.iter().enumerate() {
            for (older, older_vector) in &vectors[..newer_index] {
                let score = cosine_similarity(newer_vector, older_vector);
                if score >= self.config.near_threshold {
                    verdicts.push(self.classify(score, older.id).with_subject(newer.id));
                }
            }
        }
        Ok(verdicts)
    }

    /// One neighbour query per record; each unordered pair is reported once.
    ///
    /// Exact copies left out of `records` are still indexed and can outrank
    /// real neighbours, so each query asks for `copies` extra hits and only
    /// the first `neighbors` hits among `records` are considered.
    async fn near_pairs_indexed(
        &self,
        records: &[&MemoryRecord],
        copies: usize,
        scope: &ScopeFilter,
    ) -> Result<Vec<DuplicateVerdict>, StoreError> {
        let k = self.config.neighbors + 1 + copies;
        let position: HashMap<RecordId, usize> = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.id, index))
            .collect();
        let mut reported = HashSet::new();
        let mut verdicts = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let Some(vector) = self.store.embedding(record.id).await? else {
                continue;
            };
            let neighbours = self.store.query_similar(&vector, scope, k).await?;
            let candidates = neighbours
                .into_iter()
                .filter_map(|(neighbour, score)| Some((*position.get(&neighbour)?, score)))
                .filter(|(other, _)| *other != index)
                .take(self.config.neighbors);
            for (other, score) in candidates {
                if score < self.config.near_threshold {
                    continue;
                }
                let (older, newer) = (index.min(other), index.max(other));
                if reported.insert((older, newer)) {
                    verdicts.push(
                        self.classify(score, records[older].id)
                            .with_subject(records[newer].id),
                    );
                }
            }
        }
        Ok(verdicts)
    }
}

fn store_unavailable(err: StoreError) -> CoreError {
    CoreError::StoreUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_rs_memory::{HashingEmbedder, InMemoryRecordStore};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn engine(near: f32, related: f32) -> DedupEngine {
        DedupEngine::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(HashingEmbedder::new("hashing-v1", 16)),
            DedupConfig {
                near_threshold: near,
                related_threshold: related,
                ..DedupConfig::default()
            },
        )
    }

    #[test]
    fn classify_uses_inclusive_thresholds() {
        let engine = engine(0.95, 0.85);
        let id = Uuid::new_v4();
        let near = engine.classify(0.95, id);
        assert_eq!(near.kind, DuplicateKind::Near);
        assert_eq!(near.recommended_action, RecommendedAction::Merge);
        assert_eq!(engine.classify(0.85, id).kind, DuplicateKind::Related);
        assert_eq!(
            engine.classify(0.85, id).recommended_action,
            RecommendedAction::KeepBoth
        );
        assert_eq!(engine.classify(0.84, id).kind, DuplicateKind::Distinct);
        assert_eq!(engine.classify(1.2, id).score, 1.0);
    }

    #[tokio::test]
    async fn rejects_blank_candidates() {
        let err = engine(0.95, 0.85)
            .evaluate(" \n\t", "agent")
            .await
            .expect_err("blank");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_pool_is_distinct() {
        let verdict = engine(0.95, 0.85)
            .evaluate("first note", "agent")
            .await
            .expect("verdict");
        assert_eq!(verdict.kind, DuplicateKind::Distinct);
        assert_eq!(verdict.matched_record_id, None);
        assert!(!verdict.degraded);
    }
}
