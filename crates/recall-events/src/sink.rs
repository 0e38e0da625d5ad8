use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::Event;

/// Receiver of lifecycle notifications.
///
/// Emission is fire-and-forget: implementations must return promptly and
/// must not block the caller on I/O.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &Event) {}
}

/// Sink that records events in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event_name()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Emit through `sink`, containing any panic it raises.
pub fn emit_guarded(sink: &dyn EventSink, event: &Event) {
    if catch_unwind(AssertUnwindSafe(|| sink.emit(event))).is_err() {
        tracing::warn!(event = event.event_name(), "event sink panicked, event dropped");
    }
}
