//! Storage, embedding, audit, and membership collaborators for Agora.
//!
//! The core engines only see the traits defined here; the reference
//! implementations back the CLI and the test suites.

pub mod audit;
pub mod embedding;
pub mod error;
pub mod file;
pub mod in_memory;
pub mod membership;
pub mod store;
pub mod text;

mod table;

/// Audit sink interface and reference sinks.
pub use audit::{AuditSink, LogAuditSink, NoopAuditSink};
/// Embedding provider interface and the hashing embedder.
pub use embedding::{EmbeddingProvider, HashingEmbedder};
/// Store error type.
pub use error::StoreError;
/// JSONL-backed record store.
pub use file::FileRecordStore;
/// Process-local record store.
pub use in_memory::InMemoryRecordStore;
/// Membership interface and the in-memory directory.
pub use membership::{InMemoryMembership, MembershipSource};
/// Record store interface and query types.
pub use store::{
    CreatedAtCursor, ListRange, PutOutcome, RecordStore, ScopeFilter, SortOrder, WriteCondition,
};
