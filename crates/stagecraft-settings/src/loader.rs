//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StageSettings::default()`]
//! 2. If `~/.stagecraft/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogLevel, StageSettings};

/// Resolve the path to the settings file (`~/.stagecraft/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".stagecraft").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StageSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<StageSettings> {
    let defaults = serde_json::to_value(StageSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: StageSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut StageSettings) {
    // ── Engine settings ─────────────────────────────────────────────
    if let Some(v) = read_env_u64("STAGE_MAX_IDLE_MS", 1000, 86_400_000) {
        settings.engine.max_idle_ms = v;
    }
    if let Some(v) = read_env_u64("STAGE_MAX_PROCESSING_MS", 1000, 3_600_000) {
        settings.engine.max_processing_ms = v;
    }
    if let Some(v) = read_env_u64("STAGE_SWEEP_INTERVAL_MS", 100, 3_600_000) {
        settings.engine.sweep_interval_ms = v;
    }
    if let Some(v) = read_env_usize("STAGE_MAX_SESSIONS", 1, 10_000) {
        settings.engine.max_concurrent_sessions = v;
    }

    // ── Pacing settings ─────────────────────────────────────────────
    if let Some(v) = read_env_bool("STAGE_PACING_ENABLED") {
        settings.pacing.enabled = v;
    }
    if let Some(v) = read_env_u64("STAGE_PACING_MAX_MS", 0, 60_000) {
        settings.pacing.max_ms = v;
    }

    // ── Script settings ─────────────────────────────────────────────
    if let Some(v) = read_env_usize("STAGE_SCRIPT_STEPS", 1, 20) {
        settings.script.target_steps = v;
    }

    // ── Store settings ──────────────────────────────────────────────
    if let Some(v) = read_env_string("STAGE_DB_PATH") {
        settings.store.db_path = v;
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = read_env_string("STAGE_LOG_LEVEL") {
        match v.to_lowercase().as_str() {
            "trace" => settings.logging.level = LogLevel::Trace,
            "debug" => settings.logging.level = LogLevel::Debug,
            "info" => settings.logging.level = LogLevel::Info,
            "warn" => settings.logging.level = LogLevel::Warn,
            "error" => settings.logging.level = LogLevel::Error,
            other => tracing::warn!(value = other, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = read_env_bool("STAGE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Strict parsers ──────────────────────────────────────────────────────────

/// Parse a boolean from common textual forms.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
