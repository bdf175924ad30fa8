//! Message persister — linearized transcript writes via MPSC serialization.
//!
//! All writes for a session are serialized through a bounded channel to a
//! single consumer task, so persisted sequence order matches transcript
//! order. Persistence failures are warnings, never turn failures: the
//! in-memory session stays authoritative.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use stagecraft_core::dialogue::DialogueEntry;
use stagecraft_core::ids::SessionId;
use stagecraft_store::{SessionMeta, TranscriptStore};

/// Request sent to the persist worker.
enum PersistRequest {
    /// Append one transcript line.
    Message(DialogueEntry),
    /// Upsert the session metadata row.
    Meta(SessionMeta),
    /// Flush sentinel: reply once all prior requests are processed.
    Flush(oneshot::Sender<()>),
}

/// Linearized transcript persister for one session.
pub struct MessagePersister {
    tx: mpsc::Sender<PersistRequest>,
}

impl MessagePersister {
    /// Create a persister backed by the given store.
    ///
    /// Spawns a background task that processes writes sequentially.
    pub fn new(store: Arc<dyn TranscriptStore>, session_id: SessionId) -> Self {
        let (tx, rx) = mpsc::channel(256);
        drop(tokio::spawn(persist_worker(rx, store, session_id)));
        Self { tx }
    }

    /// Queue a transcript line without waiting for the write.
    pub fn append_fire_and_forget(&self, entry: DialogueEntry) {
        if self.tx.try_send(PersistRequest::Message(entry)).is_err() {
            warn!("transcript write dropped: persist channel full or closed");
        }
    }

    /// Queue a metadata upsert without waiting for the write.
    pub fn update_meta_fire_and_forget(&self, meta: SessionMeta) {
        if self.tx.try_send(PersistRequest::Meta(meta)).is_err() {
            warn!("session meta write dropped: persist channel full or closed");
        }
    }

    /// Wait for all queued writes to be processed.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(PersistRequest::Flush(reply_tx)).await.is_err() {
            return;
        }
        let _ = reply_rx.await;
    }
}

/// Background worker that processes persist requests sequentially.
async fn persist_worker(
    mut rx: mpsc::Receiver<PersistRequest>,
    store: Arc<dyn TranscriptStore>,
    session_id: SessionId,
) {
    while let Some(req) = rx.recv().await {
        match req {
            PersistRequest::Message(entry) => {
                if let Err(e) = store.append_message(
                    &session_id,
                    &entry.role,
                    &entry.content,
                    entry.kind,
                    entry.sequence,
                ) {
                    warn!(
                        session_id = %session_id,
                        sequence = entry.sequence,
                        error = %e,
                        "transcript write failed; in-memory state remains authoritative"
                    );
                }
            }
            PersistRequest::Meta(meta) => {
                if let Err(e) = store.update_session_meta(&session_id, &meta) {
                    warn!(session_id = %session_id, error = %e, "session meta write failed");
                }
            }
            PersistRequest::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
