//! Stored row types.

use serde::{Deserialize, Serialize};

use stagecraft_core::dialogue::{DialogueEntry, DialogueKind};
use stagecraft_core::ids::MessageId;

/// A persisted transcript message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Row id.
    pub id: MessageId,
    /// Owning session.
    pub session_id: String,
    /// Speaker name.
    pub role: String,
    /// Line text.
    pub content: String,
    /// Line classification.
    pub kind: DialogueKind,
    /// Position within the session, strictly increasing.
    pub sequence: u64,
    /// ISO 8601 write timestamp.
    pub created_at: String,
}

impl StoredMessage {
    /// View this row as a transcript entry.
    #[must_use]
    pub fn to_entry(&self) -> DialogueEntry {
        DialogueEntry {
            role: self.role.clone(),
            content: self.content.clone(),
            kind: self.kind,
            sequence: self.sequence,
        }
    }
}

/// Per-session metadata row: the durable half of session state.
///
/// The in-memory session remains authoritative while live; this row exists
/// so a session can be rehydrated after eviction or restart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    /// Current objective index.
    pub objective_index: usize,
    /// Whether the story finished.
    pub completed: bool,
    /// Scene summary replacing older transcript context.
    pub background_summary: String,
    /// Last unsatisfied-objective reason, if any.
    pub failure_reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_message_to_entry() {
        let msg = StoredMessage {
            id: MessageId::from("m1"),
            session_id: "s1".into(),
            role: "Mira".into(),
            content: "hello".into(),
            kind: DialogueKind::Actor,
            sequence: 4,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        let entry = msg.to_entry();
        assert_eq!(entry.role, "Mira");
        assert_eq!(entry.sequence, 4);
        assert_eq!(entry.kind, DialogueKind::Actor);
    }

    #[test]
    fn session_meta_defaults() {
        let meta = SessionMeta::default();
        assert_eq!(meta.objective_index, 0);
        assert!(!meta.completed);
        assert!(meta.background_summary.is_empty());
    }
}
