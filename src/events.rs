//! Session event publishing
//!
//! The core publishes session state transitions on a broadcast channel so an
//! external presentation layer can react (status icon, waveform animation)
//! without the pipeline knowing anything about rendering. Publishing is
//! best-effort — a missing subscriber never blocks or fails the pipeline.

use tokio::sync::broadcast;

use crate::session::SessionState;

/// Broadcast channel capacity — subscribers that lag simply miss events
const CHANNEL_CAPACITY: usize = 64;

/// An event published by the voice pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A wake keyword was detected and a session is starting
    WakeDetected {
        /// The matched keyword
        keyword: String,
    },
    /// The session state machine moved to a new state
    State(SessionState),
}

/// Cloneable handle to the session event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Best-effort: with no subscribers the event is dropped.
    pub fn publish(&self, event: SessionEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(?event, "no event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
