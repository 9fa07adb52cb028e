use agora_rs_memory::AuditSink;
use parking_lot::Mutex;
use serde_json::Value;

/// Audit sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event names in the order they were recorded.
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Attributes of every event with the given name.
    pub fn attributes(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, attributes)| attributes.clone())
            .collect()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: &str, attributes: Value) {
        self.events.lock().push((event.to_string(), attributes));
    }
}
