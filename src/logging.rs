//! Injected diagnostics.
//!
//! Every component that wants to report something receives a
//! [`DiagnosticSink`] when it is constructed. Production code uses
//! [`LogSink`], which forwards to the `log` facade; tests and embedders that
//! want to inspect diagnostics use [`MemorySink`].

use log::Level;
use std::sync::{Arc, Mutex};

/// Shared handle to a sink, cloned into each component.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Destination for diagnostics emitted by the client components.
pub trait DiagnosticSink: Send + Sync {
    /// Record one message at `level` for the component named by `target`.
    fn record(&self, level: Level, target: &str, message: &str);

    fn debug(&self, target: &str, message: &str) {
        self.record(Level::Debug, target, message);
    }

    fn info(&self, target: &str, message: &str) {
        self.record(Level::Info, target, message);
    }

    fn warn(&self, target: &str, message: &str) {
        self.record(Level::Warn, target, message);
    }

    fn error(&self, target: &str, message: &str) {
        self.record(Level::Error, target, message);
    }
}

/// Forwards to whatever logger the application installed for the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

/// Default sink used when the caller does not inject one.
pub fn default_sink() -> SharedSink {
    Arc::new(LogSink)
}

/// One captured diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Keeps diagnostics in memory so they can be inspected or exported.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries at exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Pretty-printed JSON array of `{level, target, message}` objects.
    pub fn export_json(&self) -> String {
        let entries: Vec<serde_json::Value> = self
            .lock()
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "level": entry.level.as_str(),
                    "target": entry.target,
                    "message": entry.message,
                })
            })
            .collect();

        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A panicking writer cannot leave the Vec half-updated, so recover the guard.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, level: Level, target: &str, message: &str) {
        self.lock().push(LogEntry {
            level,
            target: target.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.info("retry", "attempt 1");
        sink.warn("stream", "skipped fragment");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Info);
        assert_eq!(entries[0].target, "retry");
        assert_eq!(entries[1].message, "skipped fragment");
    }

    #[test]
    fn test_memory_sink_filter_and_clear() {
        let sink = MemorySink::new();
        sink.debug("client", "a");
        sink.warn("client", "b");
        sink.warn("client", "c");

        assert_eq!(sink.at_level(Level::Warn).len(), 2);
        sink.clear();
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_memory_sink_export_json() {
        let sink = MemorySink::new();
        sink.error("orchestrator", "Unknown tool");

        let exported: serde_json::Value = serde_json::from_str(&sink.export_json()).unwrap();
        assert_eq!(exported[0]["level"], "ERROR");
        assert_eq!(exported[0]["target"], "orchestrator");
        assert_eq!(exported[0]["message"], "Unknown tool");
    }

    #[test]
    fn test_log_sink_does_not_panic_without_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
        LogSink.warn("nutriplanner_ai::test", "hello");
    }
}
