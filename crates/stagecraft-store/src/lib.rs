//! # stagecraft-store
//!
//! Transcript persistence for the Stagecraft engine.
//!
//! The engine consumes the [`TranscriptStore`] contract: append dialogue
//! messages, load a session's ordered transcript, and read/write the small
//! per-session metadata row (objective index, completion, background
//! summary). Two implementations ship here:
//!
//! - [`SqliteTranscriptStore`]: r2d2-pooled `SQLite` with WAL mode and
//!   in-code migrations.
//! - [`MemoryTranscriptStore`]: in-process store for tests, with a write
//!   failure knob for exercising the engine's persistence-is-non-fatal path.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;
pub mod types;

pub use connection::{new_file, new_in_memory, ConnectionConfig, ConnectionPool};
pub use errors::{Result, StoreError};
pub use memory::MemoryTranscriptStore;
pub use migrations::run_migrations;
pub use sqlite::SqliteTranscriptStore;
pub use store::TranscriptStore;
pub use types::{SessionMeta, StoredMessage};
