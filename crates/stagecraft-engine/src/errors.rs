//! Engine error types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur managing sessions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The cast collaborator could not assemble the session.
    #[error("Cast assembly failed: {0}")]
    Cast(String),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The registry is at its concurrent-session limit.
    #[error("Session limit reached ({0} live sessions)")]
    AtCapacity(usize),

    /// The session was stopped and accepts no further work.
    #[error("Session stopped: {0}")]
    SessionStopped(String),

    /// Transcript persistence error surfaced outside the non-fatal path.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Error category string for event emission.
    pub fn category(&self) -> &str {
        match self {
            Self::Cast(_) => "cast",
            Self::SessionNotFound(_) => "session_not_found",
            Self::AtCapacity(_) => "at_capacity",
            Self::SessionStopped(_) => "session_stopped",
            Self::Persistence(_) => "persistence",
            Self::Internal(_) => "internal",
        }
    }
}

/// Outcome classification of one `advance_turn` / `interrupt` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The turn ran (or the interruption was accepted).
    #[default]
    Success,
    /// Another task is already processing this session; nothing happened.
    Busy,
    /// The story is complete; nothing happened.
    Complete,
    /// The turn was preempted by an interruption and exited silently.
    Cancelled,
    /// The turn aborted on a planning or collaborator error.
    Error,
    /// The session was stopped; nothing happened.
    Stopped,
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Busy => write!(f, "busy"),
            Self::Complete => write!(f, "complete"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
