//! Test helpers shared across Agora crates.

pub mod audit;
pub mod embedding;
pub mod membership;
pub mod records;
pub mod store;
pub mod subscriber;

pub use audit::RecordingAudit;
pub use embedding::{FailingEmbedder, FixedEmbedder};
pub use membership::{FailingMembership, UnreachableFor};
pub use records::{RecordBuilder, base_time};
pub use store::FailingStore;
pub use subscriber::RecordingSubscriber;
