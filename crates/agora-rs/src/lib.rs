//! Public SDK surface for Agora.
//!
//! This crate re-exports the building blocks of the shared memory pool and
//! provides a small initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use agora_rs_config as config;
pub use agora_rs_core as core;
/// Re-export for convenience.
pub use agora_rs_memory as memory;
/// Re-export for convenience.
pub use agora_rs_protocol as protocol;

pub use agora_rs_core::{CoreError, MemoryPool, WritePlan, WriteRequest};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
