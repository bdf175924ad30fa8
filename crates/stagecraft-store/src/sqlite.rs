//! `SQLite`-backed transcript store.

use rusqlite::params;
use tracing::instrument;

use stagecraft_core::dialogue::DialogueKind;
use stagecraft_core::ids::{MessageId, SessionId};

use crate::connection::ConnectionPool;
use crate::errors::{Result, StoreError};
use crate::store::TranscriptStore;
use crate::types::{SessionMeta, StoredMessage};

/// Transcript store over a pooled `SQLite` database.
pub struct SqliteTranscriptStore {
    pool: ConnectionPool,
}

impl SqliteTranscriptStore {
    /// Create a store over an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl TranscriptStore for SqliteTranscriptStore {
    #[instrument(skip(self, content), fields(session_id = %session_id, sequence))]
    fn append_message(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        kind: DialogueKind,
        sequence: u64,
    ) -> Result<StoredMessage> {
        let conn = self.pool.get()?;
        let message = StoredMessage {
            id: MessageId::new(),
            session_id: session_id.to_string(),
            role: role.to_owned(),
            content: content.to_owned(),
            kind,
            sequence,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let inserted = conn.execute(
            "INSERT INTO messages (id, session_id, role, content, kind, sequence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.as_str(),
                message.session_id,
                message.role,
                message.content,
                message.kind.as_str(),
                message.sequence,
                message.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(message),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::WriteRejected {
                    message: format!("duplicate sequence {sequence} for session {session_id}"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_messages(&self, session_id: &SessionId) -> Result<Vec<StoredMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, kind, sequence, created_at
             FROM messages WHERE session_id = ?1 ORDER BY sequence ASC",
        )?;

        let rows = stmt.query_map([session_id.as_str()], |row| {
            Ok(StoredMessage {
                id: MessageId::from_string(row.get::<_, String>(0)?),
                session_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                kind: DialogueKind::from_str_lossy(&row.get::<_, String>(4)?),
                sequence: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    fn update_session_meta(&self, session_id: &SessionId, meta: &SessionMeta) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO sessions (id, objective_index, completed, background_summary, failure_reason, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                 objective_index = excluded.objective_index,
                 completed = excluded.completed,
                 background_summary = excluded.background_summary,
                 failure_reason = excluded.failure_reason,
                 updated_at = excluded.updated_at",
            params![
                session_id.as_str(),
                meta.objective_index,
                i32::from(meta.completed),
                meta.background_summary,
                meta.failure_reason,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_session_meta(&self, session_id: &SessionId) -> Result<Option<SessionMeta>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT objective_index, completed, background_summary, failure_reason
             FROM sessions WHERE id = ?1",
        )?;

        let mut rows = stmt.query([session_id.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(SessionMeta {
            objective_index: row.get(0)?,
            completed: row.get::<_, i32>(1)? != 0,
            background_summary: row.get(2)?,
            failure_reason: row.get(3)?,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{new_in_memory, ConnectionConfig};
    use crate::migrations::run_migrations;
    use assert_matches::assert_matches;

    fn make_store() -> SqliteTranscriptStore {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        SqliteTranscriptStore::new(pool)
    }

    #[test]
    fn append_and_load_ordered() {
        let store = make_store();
        let sid = SessionId::from("s1");

        let _ = store
            .append_message(&sid, "Narration", "It begins.", DialogueKind::Narration, 0)
            .unwrap();
        let _ = store
            .append_message(&sid, "Mira", "Hello.", DialogueKind::Actor, 1)
            .unwrap();

        let messages = store.load_messages(&sid).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence, 0);
        assert_eq!(messages[1].role, "Mira");
        assert_eq!(messages[1].kind, DialogueKind::Actor);
    }

    #[test]
    fn load_messages_empty_session() {
        let store = make_store();
        let messages = store.load_messages(&SessionId::from("nope")).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn duplicate_sequence_is_write_rejected() {
        let store = make_store();
        let sid = SessionId::from("s1");
        let _ = store
            .append_message(&sid, "Mira", "one", DialogueKind::Actor, 0)
            .unwrap();
        let dup = store.append_message(&sid, "Mira", "two", DialogueKind::Actor, 0);
        assert_matches!(dup, Err(StoreError::WriteRejected { .. }));
    }

    #[test]
    fn sessions_do_not_share_messages() {
        let store = make_store();
        let _ = store
            .append_message(&SessionId::from("a"), "Mira", "hi", DialogueKind::Actor, 0)
            .unwrap();
        let other = store.load_messages(&SessionId::from("b")).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn meta_upsert_roundtrip() {
        let store = make_store();
        let sid = SessionId::from("s1");

        assert!(store.load_session_meta(&sid).unwrap().is_none());

        let meta = SessionMeta {
            objective_index: 1,
            completed: false,
            background_summary: "They met at the pier.".into(),
            failure_reason: String::new(),
        };
        store.update_session_meta(&sid, &meta).unwrap();
        assert_eq!(store.load_session_meta(&sid).unwrap(), Some(meta));

        let updated = SessionMeta {
            objective_index: 2,
            completed: true,
            background_summary: "All resolved.".into(),
            failure_reason: String::new(),
        };
        store.update_session_meta(&sid, &updated).unwrap();
        assert_eq!(store.load_session_meta(&sid).unwrap(), Some(updated));
    }

    #[test]
    fn file_backed_store_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.db");
        let path = path.to_str().unwrap();
        let sid = SessionId::from("s1");

        {
            let pool = crate::connection::new_file(path, &ConnectionConfig::default()).unwrap();
            {
                let conn = pool.get().unwrap();
                run_migrations(&conn).unwrap();
            }
            let store = SqliteTranscriptStore::new(pool);
            let _ = store
                .append_message(&sid, "Mira", "persisted", DialogueKind::Actor, 0)
                .unwrap();
        }

        let pool = crate::connection::new_file(path, &ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        let store = SqliteTranscriptStore::new(pool);
        let messages = store.load_messages(&sid).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persisted");
    }
}
