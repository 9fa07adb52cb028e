//! Error types for store, index, and membership collaborators.

use agora_rs_protocol::RecordId;

/// Errors returned by record stores and their companions.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The vector index or embedding provider cannot serve requests.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    /// A create targeted an id that is already stored.
    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),
    /// A conditional write targeted a record that is not stored.
    #[error("record not found: {0}")]
    NotFound(RecordId),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failure only affects vector similarity.
    pub fn is_index_failure(&self) -> bool {
        matches!(self, StoreError::IndexUnavailable(_))
    }
}
