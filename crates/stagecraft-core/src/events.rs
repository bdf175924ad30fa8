//! Session event types.
//!
//! [`StageEvent`] is the single event family the engine emits: dialogue
//! lines, typing indicators, objective progress, director activity, plain
//! status notices, and errors. Events are broadcast to connected clients and
//! are purely observational — replaying them never mutates engine state.
//!
//! Every event carries an [`EventBase`] with the session id and the epoch the
//! emitting task was running under. Consumers use the epoch tag to discard
//! output from work that was preempted by a player interruption.

use serde::{Deserialize, Serialize};

use crate::dialogue::DialogueEntry;
use crate::ids::SessionId;

/// Common fields for all stage events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBase {
    /// Session this event belongs to.
    pub session_id: SessionId,
    /// Epoch the emitting task captured at the start of its work.
    pub epoch: u64,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl EventBase {
    /// Create a new base with the current UTC timestamp.
    #[must_use]
    pub fn now(session_id: &SessionId, epoch: u64) -> Self {
        Self {
            session_id: session_id.clone(),
            epoch,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Typing indicator state for one role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingStatus {
    /// The role is composing a line.
    Typing,
    /// The role finished composing.
    Idle,
}

/// Director activity state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorActivity {
    /// The director is planning or scripting.
    Directing,
    /// The director is done.
    Idle,
}

/// Objective progress payload, derived from session state and emitted after
/// every objective check. Never stored as a source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveProgress {
    /// Whether the checked objective was judged complete.
    pub completed: bool,
    /// Human-readable progress message.
    pub message: String,
    /// The director's stated reason.
    pub reason: String,
    /// Current objective index after the check.
    pub index: usize,
    /// The objective now in play, if any remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// Total number of objectives.
    pub total: usize,
    /// Whether the whole story is finished.
    pub story_completed: bool,
}

/// Events emitted by the session engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageEvent {
    /// A transcript line was produced.
    Dialogue {
        /// Common fields.
        base: EventBase,
        /// The produced line.
        entry: DialogueEntry,
    },

    /// A role started or stopped composing.
    TypingIndicator {
        /// Common fields.
        base: EventBase,
        /// The role that is typing.
        role: String,
        /// Typing state.
        status: TypingStatus,
    },

    /// Objective progress after a director check.
    ObjectiveStatus {
        /// Common fields.
        base: EventBase,
        /// The derived progress payload.
        progress: ObjectiveProgress,
    },

    /// Director planning activity changed.
    DirectorStatus {
        /// Common fields.
        base: EventBase,
        /// Activity state.
        status: DirectorActivity,
        /// Optional activity message.
        message: String,
    },

    /// Plain status notice (session lifecycle, recovery, busy hints).
    Status {
        /// Common fields.
        base: EventBase,
        /// The notice text.
        message: String,
    },

    /// A turn aborted with an error.
    Error {
        /// Common fields.
        base: EventBase,
        /// Error description.
        message: String,
    },
}

impl StageEvent {
    /// Wire name of this event, matching the external socket contract.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dialogue { .. } => "dialogue",
            Self::TypingIndicator { .. } => "typing_indicator",
            Self::ObjectiveStatus { .. } => "objective_status",
            Self::DirectorStatus { .. } => "director_status",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }

    /// The common base fields.
    pub fn base(&self) -> &EventBase {
        match self {
            Self::Dialogue { base, .. }
            | Self::TypingIndicator { base, .. }
            | Self::ObjectiveStatus { base, .. }
            | Self::DirectorStatus { base, .. }
            | Self::Status { base, .. }
            | Self::Error { base, .. } => base,
        }
    }

    /// Epoch the emitting task was running under.
    pub fn epoch(&self) -> u64 {
        self.base().epoch
    }
}

/// Convenience constructor for a [`StageEvent::Status`].
#[must_use]
pub fn status_event(session_id: &SessionId, epoch: u64, message: impl Into<String>) -> StageEvent {
    StageEvent::Status {
        base: EventBase::now(session_id, epoch),
        message: message.into(),
    }
}

/// Convenience constructor for a [`StageEvent::Error`].
#[must_use]
pub fn error_event(session_id: &SessionId, epoch: u64, message: impl Into<String>) -> StageEvent {
    StageEvent::Error {
        base: EventBase::now(session_id, epoch),
        message: message.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
