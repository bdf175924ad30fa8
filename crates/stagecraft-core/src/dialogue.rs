//! Transcript dialogue types.
//!
//! A session's transcript is an ordered, append-only sequence of
//! [`DialogueEntry`] values. Sequence numbers are strictly increasing and
//! assigned by the engine, never by collaborators.

use serde::{Deserialize, Serialize};

/// Classification of a transcript line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueKind {
    /// A line spoken by an AI-controlled character.
    Actor,
    /// Scene-setting narration.
    Narration,
    /// The human participant's own line.
    Player,
    /// A line from an unrecognized role, kept verbatim.
    Other,
}

impl DialogueKind {
    /// Wire string for persistence and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Narration => "narration",
            Self::Player => "player",
            Self::Other => "other",
        }
    }

    /// Parse a stored kind string; unknown values map to [`DialogueKind::Other`].
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "actor" => Self::Actor,
            "narration" => Self::Narration,
            "player" => Self::Player,
            _ => Self::Other,
        }
    }
}

/// One line of the session transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueEntry {
    /// Speaker name ("Narration" for narration lines).
    pub role: String,
    /// The spoken or narrated text.
    pub content: String,
    /// Line classification.
    pub kind: DialogueKind,
    /// Strictly increasing position within the session.
    pub sequence: u64,
}

impl DialogueEntry {
    /// Render as a `Role: content` prompt line.
    #[must_use]
    pub fn speaker_line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Render a transcript slice as newline-joined speaker lines, the form the
/// director and performers consume.
#[must_use]
pub fn render_transcript(entries: &[DialogueEntry]) -> String {
    entries
        .iter()
        .map(DialogueEntry::speaker_line)
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
