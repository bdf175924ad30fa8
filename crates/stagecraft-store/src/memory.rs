//! In-memory transcript store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use stagecraft_core::dialogue::DialogueKind;
use stagecraft_core::ids::{MessageId, SessionId};

use crate::errors::{Result, StoreError};
use crate::store::TranscriptStore;
use crate::types::{SessionMeta, StoredMessage};

#[derive(Default)]
struct SessionRecord {
    messages: Vec<StoredMessage>,
    meta: Option<SessionMeta>,
}

/// In-process store for tests and examples.
///
/// `fail_writes` lets tests exercise the engine's persistence-is-non-fatal
/// path: while set, every write returns [`StoreError::Injected`].
#[derive(Default)]
pub struct MemoryTranscriptStore {
    inner: Mutex<HashMap<String, SessionRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryTranscriptStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle write-failure injection.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of messages stored for a session.
    pub fn message_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .lock()
            .get(session_id.as_str())
            .map_or(0, |r| r.messages.len())
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn append_message(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        kind: DialogueKind,
        sequence: u64,
    ) -> Result<StoredMessage> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected);
        }

        let mut inner = self.inner.lock();
        let record = inner.entry(session_id.to_string()).or_default();
        if record.messages.iter().any(|m| m.sequence == sequence) {
            return Err(StoreError::WriteRejected {
                message: format!("duplicate sequence {sequence} for session {session_id}"),
            });
        }

        let message = StoredMessage {
            id: MessageId::new(),
            session_id: session_id.to_string(),
            role: role.to_owned(),
            content: content.to_owned(),
            kind,
            sequence,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        record.messages.push(message.clone());
        record.messages.sort_by_key(|m| m.sequence);
        Ok(message)
    }

    fn load_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>> {
        Ok(self
            .inner
            .lock()
            .get(session_id.as_str())
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }

    fn update_session_meta(&self, session_id: &SessionId, meta: &SessionMeta) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected);
        }
        let mut inner = self.inner.lock();
        inner.entry(session_id.to_string()).or_default().meta = Some(meta.clone());
        Ok(())
    }

    fn load_session_meta(&self, session_id: &SessionId) -> Result<Option<SessionMeta>> {
        Ok(self
            .inner
            .lock()
            .get(session_id.as_str())
            .and_then(|r| r.meta.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
