//! Store error types.

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the transcript store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored row failed to decode.
    #[error("Corrupt row: {message}")]
    CorruptRow {
        /// Error description.
        message: String,
    },

    /// A write was rejected (duplicate sequence, constraint violation).
    #[error("Write rejected: {message}")]
    WriteRejected {
        /// Error description.
        message: String,
    },

    /// Simulated failure from a test store.
    #[error("Injected store failure")]
    Injected,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
