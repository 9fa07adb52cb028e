//! Embedding provider interface and a deterministic reference embedder.

use crate::error::StoreError;
use crate::text::{l2_normalize, tokenize};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
/// Turns text into vectors for the similarity index.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier recorded in each record's embedding reference.
    fn model(&self) -> &str;

    /// Embed the text. Failures should be reported as
    /// [`StoreError::IndexUnavailable`] so callers can degrade.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

/// Feature-hashing bag-of-words embedder.
///
/// Each token is hashed into one of `dimensions` buckets with a sign bit and
/// the result is L2-normalized, so cosine similarity tracks token overlap.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding used by the async trait method.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.embed_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::cosine_similarity;

    #[test]
    fn identical_text_embeds_identically() {
        let embedder = HashingEmbedder::new("hashing-v1", 64);
        let first = embedder.embed_text("AAPL price is 187");
        let second = embedder.embed_text("aapl  PRICE is 187");
        assert_eq!(first, second);
        assert!((cosine_similarity(&first, &second) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlap_scores_between_disjoint_and_identical() {
        let embedder = HashingEmbedder::new("hashing-v1", 256);
        let base = embedder.embed_text("deploy the payments service on friday");
        let close = embedder.embed_text("deploy the payments service on monday");
        let far = embedder.embed_text("quarterly revenue grew strongly");
        let close_score = cosine_similarity(&base, &close);
        assert!(close_score > cosine_similarity(&base, &far));
        assert!(close_score < 1.0);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashingEmbedder::new("hashing-v1", 8);
        assert!(embedder.embed_text("  ").iter().all(|value| *value == 0.0));
    }
}
