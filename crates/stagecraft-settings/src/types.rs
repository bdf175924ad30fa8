//! Settings sections: engine lifecycle, pacing, scripting, store, logging.

use serde::{Deserialize, Serialize};

/// Top-level settings document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageSettings {
    /// Settings document name.
    pub name: String,
    /// Session lifecycle and concurrency settings.
    pub engine: EngineSettings,
    /// Dialogue pacing settings.
    pub pacing: PacingSettings,
    /// Script generation settings.
    pub script: ScriptSettings,
    /// Transcript store settings.
    pub store: StoreSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            name: "stagecraft".to_string(),
            engine: EngineSettings::default(),
            pacing: PacingSettings::default(),
            script: ScriptSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Session lifecycle and concurrency settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Idle time before a clientless session is evicted, in milliseconds.
    pub max_idle_ms: u64,
    /// Processing time before a turn is considered stuck, in milliseconds.
    pub max_processing_ms: u64,
    /// Interval between maintenance sweeps, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Maximum number of concurrently live sessions.
    pub max_concurrent_sessions: usize,
    /// Capacity of the per-session continuation queue.
    pub continuation_queue: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_idle_ms: 3_600_000,
            max_processing_ms: 60_000,
            sweep_interval_ms: 300_000,
            max_concurrent_sessions: 200,
            continuation_queue: 4,
        }
    }
}

/// Dialogue pacing settings — a readability throttle, not a correctness
/// mechanism. The delay grows with the line length and is capped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PacingSettings {
    /// Whether pacing delays are applied at all.
    pub enabled: bool,
    /// Base delay before any line, in milliseconds.
    pub base_ms: u64,
    /// Additional delay per character of output, in milliseconds.
    pub per_char_ms: u64,
    /// Upper bound on a single delay, in milliseconds.
    pub max_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_ms: 800,
            per_char_ms: 12,
            max_ms: 4_000,
        }
    }
}

/// Script generation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptSettings {
    /// Number of script steps requested from the director per turn.
    pub target_steps: usize,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self { target_steps: 5 }
    }
}

/// Transcript store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database path (relative to `~/.stagecraft`).
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// `SQLite` page cache size in KiB.
    pub cache_size_kib: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "transcripts.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 4096,
        }
    }
}

/// Log level for subscriber initialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level for emitted logs.
    pub level: LogLevel,
    /// Emit JSON-formatted log lines instead of human-readable ones.
    pub json: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
