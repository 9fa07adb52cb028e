use agora_rs_memory::{EmbeddingProvider, HashingEmbedder, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Embedder returning pinned vectors for known texts and hashing the rest.
pub struct FixedEmbedder {
    vectors: RwLock<HashMap<String, Vec<f32>>>,
    fallback: HashingEmbedder,
}

impl FixedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            fallback: HashingEmbedder::new("fixed-test", dimensions),
        }
    }

    /// Pin the vector returned for `text` (matched after whitespace
    /// normalization).
    pub fn with(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.write().insert(normalize(text), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if let Some(vector) = self.vectors.read().get(&normalize(text)) {
            return Ok(vector.clone());
        }
        Ok(self.fallback.embed_text(text))
    }
}

/// Hashing embedder that can be switched into a failing state.
pub struct FailingEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
}

impl FailingEmbedder {
    /// Starts failing.
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: HashingEmbedder::new("failing-test", dimensions),
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model(&self) -> &str {
        "failing-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::IndexUnavailable("embedder offline".to_string()));
        }
        Ok(self.inner.embed_text(text))
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
