//! Core engines for Agora.
//!
//! This crate owns duplicate detection, access evaluation, the event bus, and
//! progressive search, and ties them together in the [`MemoryPool`] facade.

pub mod access;
pub mod bus;
pub mod content;
pub mod dedup;
pub mod error;
pub mod pool;
pub mod search;
pub mod tokens;

pub use access::{AccessEvaluator, AccessTarget};
/// Event bus and subscriber callback interface.
pub use bus::{DeliveryError, EventCallback, PublishAck, SyncBus};
pub use dedup::DedupEngine;
pub use error::CoreError;
/// Pool facade and write-path types.
pub use pool::{MemoryPool, MemoryPoolBuilder, UpdateOutcome, WriteOutcome, WritePlan, WriteRequest};
pub use search::{ExploreOptions, SearchEngine, SearchOptions, TimelineWindow};
pub use tokens::estimate_tokens;
