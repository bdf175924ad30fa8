//! # stagecraft-settings
//!
//! Configuration management with layered sources for the Stagecraft engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`StageSettings::default()`]
//! 2. **User file** — `~/.stagecraft/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `STAGE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton, initialized on first access via [`get_settings`].
static SETTINGS: OnceLock<StageSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.stagecraft/settings.json` with env
/// var overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
pub fn get_settings() -> &'static StageSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: StageSettings) -> std::result::Result<(), StageSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
