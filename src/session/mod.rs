//! Conversation session state and arbitration
//!
//! Exactly one conversation session may be active system-wide: the session
//! and the keyword spotter both consume the single microphone, and the
//! session owns the only mutable conversation history. The [`SessionArbiter`]
//! is the process-wide gate enforcing that.

mod clock;
mod dialogue;

pub use clock::{Clock, TokioClock};
pub use dialogue::{ConversationTurn, DialogueSession, Role, matches_exit_intent};

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::events::{EventBus, SessionEvent};

/// State of the conversation session state machine
///
/// Exactly one authoritative instance exists, inside the [`SessionArbiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session active; spotting cycles may capture audio
    Idle,
    /// Session acquired, waiting for the next user turn
    Listening,
    /// Recording an utterance from the microphone
    Recording,
    /// Transcribing a recorded utterance
    Transcribing,
    /// Remote assistant run in flight
    Thinking,
    /// Speaking a reply
    Responding,
    /// Session winding down (farewell, release)
    Quitting,
}

/// Process-wide gate allowing one active session and one microphone consumer
///
/// `try_acquire` is the only way to enter a session; acquisition failure is
/// an expected contention outcome, not an error. All state transitions are
/// serialized through the internal lock. An atomic flag mirrors the busy
/// status so spotting cycles can check it without taking the lock.
#[derive(Debug)]
pub struct SessionArbiter {
    busy: AtomicBool,
    state: Mutex<SessionState>,
    events: EventBus,
}

impl SessionArbiter {
    /// Create a new arbiter in the `Idle` state
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            busy: AtomicBool::new(false),
            state: Mutex::new(SessionState::Idle),
            events,
        }
    }

    /// Attempt to start a session: `Idle` -> `Listening`
    ///
    /// Non-blocking. Returns false if another session is already active.
    /// Check-then-lock-then-recheck so concurrent callers cannot both
    /// observe success.
    pub fn try_acquire(&self) -> bool {
        if self.busy.load(Ordering::Acquire) {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != SessionState::Idle {
            return false;
        }

        *state = SessionState::Listening;
        self.busy.store(true, Ordering::Release);
        drop(state);

        self.events.publish(SessionEvent::State(SessionState::Listening));
        tracing::debug!("session acquired");
        true
    }

    /// Move the active session to a new state
    ///
    /// Ignored with a warning if no session is held — transitions are only
    /// meaningful between `try_acquire` and `release`.
    pub fn transition(&self, to: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == SessionState::Idle {
            tracing::warn!(?to, "transition without an active session");
            return;
        }

        let from = *state;
        *state = to;
        drop(state);

        tracing::debug!(?from, ?to, "session state");
        self.events.publish(SessionEvent::State(to));
    }

    /// End the session: any state -> `Idle`
    ///
    /// Idempotent; releasing an idle arbiter is a no-op.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == SessionState::Idle {
            return;
        }

        *state = SessionState::Idle;
        self.busy.store(false, Ordering::Release);
        drop(state);

        self.events.publish(SessionEvent::State(SessionState::Idle));
        tracing::debug!("session released");
    }

    /// Whether a session is currently active
    ///
    /// Lock-free; spotting cycles call this before every capture.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> SessionArbiter {
        SessionArbiter::new(EventBus::new())
    }

    #[test]
    fn test_acquire_release_cycle() {
        let arb = arbiter();
        assert!(!arb.is_busy());
        assert_eq!(arb.state(), SessionState::Idle);

        assert!(arb.try_acquire());
        assert!(arb.is_busy());
        assert_eq!(arb.state(), SessionState::Listening);

        // Second acquire fails while held
        assert!(!arb.try_acquire());

        arb.release();
        assert!(!arb.is_busy());
        assert_eq!(arb.state(), SessionState::Idle);

        // Reacquirable after release
        assert!(arb.try_acquire());
    }

    #[test]
    fn test_transition_requires_active_session() {
        let arb = arbiter();

        // Ignored while idle
        arb.transition(SessionState::Thinking);
        assert_eq!(arb.state(), SessionState::Idle);

        assert!(arb.try_acquire());
        arb.transition(SessionState::Thinking);
        assert_eq!(arb.state(), SessionState::Thinking);
    }

    #[test]
    fn test_release_is_idempotent() {
        let arb = arbiter();
        arb.release();
        arb.release();
        assert!(arb.try_acquire());
        arb.release();
        arb.release();
        assert!(!arb.is_busy());
    }
}
