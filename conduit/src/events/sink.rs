//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives engine lifecycle events.
///
/// Sinks must not fail: delivery problems are theirs to log and swallow.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// * `event_type` - one of the names in [`kinds`](super::kinds)
    /// * `data` - structured payload, usually step name and identifiers
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The executor default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing` at a fixed level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`. Anything other than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        if self.level == Level::DEBUG {
            debug!(event_type, event_data = ?data, "Engine event");
        } else {
            info!(event_type, event_data = ?data, "Engine event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Payloads of the events named exactly `event_type`.
    #[must_use]
    pub fn payloads_of(&self, event_type: &str) -> Vec<Option<Value>> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Number of events named exactly `event_type`.
    #[must_use]
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events.read().iter().filter(|(t, _)| t == event_type).count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::kinds;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(kinds::NODE_STARTED, None).await;
        LoggingEventSink::default()
            .emit(kinds::BATCH_ADVANCED, Some(json!({"step": "extract"})))
            .await;
        LoggingEventSink::debug().try_emit(kinds::NODE_COMPLETED, None);
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(kinds::NODE_STARTED, Some(json!({"step": "input"}))).await;
        sink.try_emit(kinds::LINEAGE_EXHAUSTED, Some(json!({"step": "load"})));
        sink.emit(kinds::NODE_STARTED, Some(json!({"step": "load"}))).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count_of(kinds::NODE_STARTED), 2);
        assert_eq!(
            sink.payloads_of(kinds::LINEAGE_EXHAUSTED),
            vec![Some(json!({"step": "load"}))]
        );
        assert_eq!(sink.events()[0].0, kinds::NODE_STARTED);
    }
}
