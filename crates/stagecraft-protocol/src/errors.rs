//! Protocol error types.

use serde_json;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur calling the director or a performer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON deserialization of a collaborator response failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but did not form a usable plan or script.
    #[error("Malformed plan: {message}")]
    MalformedPlan {
        /// Error description.
        message: String,
    },

    /// The backend call itself failed (network, timeout, upstream error).
    #[error("Backend error: {message}")]
    Backend {
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// The call was cancelled.
    #[error("Call cancelled")]
    Cancelled,

    /// Collaborator-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProtocolError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { retryable, .. } => *retryable,
            Self::Json(_) | Self::MalformedPlan { .. } | Self::Cancelled | Self::Other { .. } => {
                false
            }
        }
    }

    /// Error category string for event emission.
    pub fn category(&self) -> &str {
        match self {
            Self::Json(_) | Self::MalformedPlan { .. } => "planning",
            Self::Backend { .. } => "collaborator",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
