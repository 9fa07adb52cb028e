//! Error types for the core engines.

use agora_rs_config::ConfigError;
use agora_rs_memory::StoreError;
use agora_rs_protocol::RecordId;
use thiserror::Error;

/// Errors returned by pool, dedup, access, bus, and search operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input; retrying will not help.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The record does not exist. Never returned to callers of record
    /// operations; see [`CoreError::masked`].
    #[error("record not found: {0}")]
    NotFound(RecordId),
    /// The caller may not perform the operation on the resource.
    #[error("access denied: {resource}")]
    AuthorizationDenied { resource: String },
    /// The record store or membership source failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// The vector index or embedding provider failed.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Denial for a record id.
    pub fn denied(record_id: RecordId) -> Self {
        CoreError::AuthorizationDenied {
            resource: record_id.to_string(),
        }
    }

    /// Hide whether a record exists: `NotFound` becomes the same denial a
    /// policy failure produces.
    pub fn masked(self) -> Self {
        match self {
            CoreError::NotFound(record_id) => CoreError::denied(record_id),
            other => other,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IndexUnavailable(message) => CoreError::IndexUnavailable(message),
            StoreError::NotFound(record_id) => CoreError::NotFound(record_id),
            StoreError::AlreadyExists(record_id) => {
                CoreError::Validation(format!("record already exists: {record_id}"))
            }
            other => CoreError::StoreUnavailable(other.to_string()),
        }
    }
}
