//! Fire-and-forget audit trail.

use log::info;
use serde_json::Value;

/// Records auditable operations; implementations must not block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &str, attributes: Value);
}

/// Writes audit events to the `agora::audit` log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: &str, attributes: Value) {
        info!(target: "agora::audit", "{event} ({attributes})");
    }
}

/// Discards audit events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &str, _attributes: Value) {}
}
