//! Exception event reporting.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Topic for faults that terminate a worker.
pub const UNHANDLED_EXCEPTION_TOPIC: &str = "unhandled-exception";

/// Destination for operator-visible exception events.
pub trait EventSink: Send {
    /// Reports one exception.
    fn exception(&self, topic: &str, message: &str, kind: &str);

    /// Flushes and releases the sink. Idempotent.
    fn close(&self);
}

/// Emits events as `tracing` errors under the `nodestore::events` target.
#[derive(Debug, Clone)]
pub struct TracingEventSink {
    source: String,
}

impl TracingEventSink {
    /// Creates a sink that tags every event with `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Returns the source name.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl EventSink for TracingEventSink {
    fn exception(&self, topic: &str, message: &str, kind: &str) {
        tracing::error!(
            target: "nodestore::events",
            source = %self.source,
            topic,
            kind,
            "{message}"
        );
    }

    fn close(&self) {}
}

/// A reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event topic.
    pub topic: String,
    /// Human-readable message.
    pub message: String,
    /// Error classification.
    pub kind: String,
}

/// Collects events in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<Event>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event reported so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventSink for MemoryEventSink {
    fn exception(&self, topic: &str, message: &str, kind: &str) {
        self.events.lock().push(Event {
            topic: topic.to_string(),
            message: message.to_string(),
            kind: kind.to_string(),
        });
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
