//! Event emission: broadcast channel plus optional external sink.
//!
//! Every orchestrator owns an [`EventEmitter`]; subscribers (socket fan-out,
//! tests) receive a clone of each event. An external [`EventSink`] can be
//! attached late — a session created before any client connects gains its
//! sink when the first client joins.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use stagecraft_core::events::StageEvent;

/// Push-style consumer of stage events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: &StageEvent);
}

/// Broadcast emitter with optional attached sink.
pub struct EventEmitter {
    tx: broadcast::Sender<StageEvent>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl EventEmitter {
    /// Create an emitter with the given broadcast capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sink: Mutex::new(None),
        }
    }

    /// Emit to all subscribers and the attached sink, if any.
    ///
    /// A send error only means no subscriber is currently listening.
    pub fn emit(&self, event: StageEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.emit(&event);
        }
        trace!(event_type = event.event_type(), epoch = event.epoch(), "emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events from this emitter.
    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.tx.subscribe()
    }

    /// Attach a sink if none is attached yet. Returns whether it attached.
    pub fn attach_sink_if_absent(&self, sink: Arc<dyn EventSink>) -> bool {
        let mut current = self.sink.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(sink);
        true
    }

    /// Whether an external sink is attached.
    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
