//! Configuration schema for Agora.

use serde::{Deserialize, Serialize};

/// Root config for the shared memory pool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgoraConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl AgoraConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> AgoraConfigBuilder {
        AgoraConfigBuilder::new()
    }
}

/// Builder for assembling an `AgoraConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct AgoraConfigBuilder {
    config: AgoraConfig,
}

impl AgoraConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: AgoraConfig::default(),
        }
    }

    /// Replace the deduplication thresholds.
    pub fn dedup(mut self, dedup: DedupConfig) -> Self {
        self.config.dedup = dedup;
        self
    }

    /// Replace the event bus settings.
    pub fn bus(mut self, bus: BusConfig) -> Self {
        self.config.bus = bus;
        self
    }

    /// Replace the search settings.
    pub fn search(mut self, search: SearchConfig) -> Self {
        self.config.search = search;
        self
    }

    /// Replace the summary settings.
    pub fn summary(mut self, summary: SummaryConfig) -> Self {
        self.config.summary = summary;
        self
    }

    /// Replace the record store settings.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replace the embedding settings.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Finalize and return the built `AgoraConfig`.
    pub fn build(self) -> AgoraConfig {
        self.config
    }
}

/// Similarity thresholds and index query sizes for duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupConfig {
    /// Cosine similarity at or above which content is a near-duplicate.
    #[serde(default = "default_near_threshold")]
    pub near_threshold: f32,
    /// Cosine similarity at or above which content is related.
    #[serde(default = "default_related_threshold")]
    pub related_threshold: f32,
    /// Neighbours requested per index query.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
    /// Largest record count compared pairwise in-process during compaction.
    #[serde(default = "default_pairwise_limit")]
    pub pairwise_limit: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            near_threshold: default_near_threshold(),
            related_threshold: default_related_threshold(),
            neighbors: default_neighbors(),
            pairwise_limit: default_pairwise_limit(),
        }
    }
}

fn default_near_threshold() -> f32 {
    0.95
}

fn default_related_threshold() -> f32 {
    0.85
}

fn default_neighbors() -> usize {
    5
}

fn default_pairwise_limit() -> usize {
    200
}

/// Delivery settings for the event synchronization bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusConfig {
    /// Maximum events coalesced into one delivery.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after a full batch before the next delivery, in milliseconds.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    /// Retries after a failed delivery before the batch is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Time a single delivery may take before it counts as failed, in
    /// milliseconds.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Events buffered per subscription; further events are dropped for that
    /// subscriber until it catches up.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_batch_interval_ms() -> u64 {
    25
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_delivery_timeout_ms() -> u64 {
    5_000
}

fn default_queue_capacity() -> usize {
    1_024
}

/// Ranking weights and limits for progressive disclosure search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Weight of the lexical score in hybrid ranking.
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,
    /// Weight of the vector score in hybrid ranking.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    /// Initial number of vector candidates fetched per index query.
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
    /// Maximum ids accepted by a batch fetch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Records read per page while filling a timeline window.
    #[serde(default = "default_timeline_page_size")]
    pub timeline_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            vector_weight: default_vector_weight(),
            candidate_pool: default_candidate_pool(),
            max_batch_size: default_max_batch_size(),
            timeline_page_size: default_timeline_page_size(),
        }
    }
}

fn default_text_weight() -> f32 {
    0.3
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_candidate_pool() -> usize {
    50
}

fn default_max_batch_size() -> usize {
    100
}

fn default_timeline_page_size() -> usize {
    32
}

/// Summary derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_max_chars")]
    pub max_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_chars: default_summary_max_chars(),
        }
    }
}

fn default_summary_max_chars() -> usize {
    200
}

/// Record store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub provider: StoreProvider,
    /// Backing file for the file provider.
    #[serde(default)]
    pub path: Option<String>,
}

/// Available record store backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// Process-local store; contents are lost on exit.
    Memory,
    /// JSONL file store.
    #[default]
    File,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
        }
    }
}

fn default_embedding_model() -> String {
    "hashing-v1".to_string()
}

fn default_embedding_dimensions() -> usize {
    256
}
