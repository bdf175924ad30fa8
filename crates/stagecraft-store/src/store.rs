//! The `TranscriptStore` contract consumed by the engine.

use stagecraft_core::dialogue::DialogueKind;
use stagecraft_core::ids::SessionId;

use crate::errors::Result;
use crate::types::{SessionMeta, StoredMessage};

/// Durable transcript and session-metadata storage.
///
/// Implementations must be `Send + Sync`; the engine calls them from a
/// dedicated persistence worker and treats every failure as non-fatal — the
/// in-memory session state stays authoritative.
pub trait TranscriptStore: Send + Sync {
    /// Append one message. Rejects duplicate `(session_id, sequence)` pairs.
    fn append_message(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        kind: DialogueKind,
        sequence: u64,
    ) -> Result<StoredMessage>;

    /// Load a session's messages ordered by sequence.
    fn load_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>>;

    /// Upsert the session metadata row.
    fn update_session_meta(&self, session_id: &SessionId, meta: &SessionMeta) -> Result<()>;

    /// Load the session metadata row, if one exists.
    fn load_session_meta(&self, session_id: &SessionId) -> Result<Option<SessionMeta>>;
}
