//! In-code schema migrations.
//!
//! Migrations are versioned SQL batches applied in order; applied versions
//! are tracked in `schema_migrations`. Safe to call on every startup.

use rusqlite::Connection;
use tracing::debug;

use crate::errors::Result;

/// Ordered schema migrations. Append only — never edit a shipped entry.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS sessions (
         id TEXT PRIMARY KEY,
         objective_index INTEGER NOT NULL DEFAULT 0,
         completed INTEGER NOT NULL DEFAULT 0,
         background_summary TEXT NOT NULL DEFAULT '',
         failure_reason TEXT NOT NULL DEFAULT '',
         updated_at TEXT NOT NULL
     );
     CREATE TABLE IF NOT EXISTS messages (
         id TEXT PRIMARY KEY,
         session_id TEXT NOT NULL,
         role TEXT NOT NULL,
         content TEXT NOT NULL,
         kind TEXT NOT NULL,
         sequence INTEGER NOT NULL,
         created_at TEXT NOT NULL,
         UNIQUE (session_id, sequence)
     );
     CREATE INDEX IF NOT EXISTS idx_messages_session
         ON messages (session_id, sequence);",
)];

/// Apply any unapplied migrations to the connection's database.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;

    for (version, sql) in MIGRATIONS {
        let applied: bool = conn
            .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?
            .exists([version])?;
        if applied {
            continue;
        }
        conn.execute_batch(sql)?;
        let _ = conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )?;
        debug!(version, "applied migration");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
