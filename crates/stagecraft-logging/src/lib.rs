//! # stagecraft-logging
//!
//! Structured logging with `tracing` for the Stagecraft engine.
//!
//! One call to [`init`] at process start wires up an env-filtered `fmt`
//! subscriber. `RUST_LOG` takes precedence over the configured level, so
//! operators can raise verbosity per-module without touching settings.

#![deny(unsafe_code)]

use stagecraft_settings::LoggingSettings;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the env filter: `RUST_LOG` wins, settings level is the fallback.
fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_filter_str()))
}

/// Initialize the global subscriber. Panics if one is already set.
pub fn init(settings: &LoggingSettings) {
    try_init(settings).expect("global tracing subscriber already set");
}

/// Initialize the global subscriber, returning an error if one is already
/// set. Safe to call from every test.
pub fn try_init(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let filter = build_filter(settings);
    if settings.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
            .map_err(|e| -> Box<dyn std::error::Error> { e })
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .map_err(|e| -> Box<dyn std::error::Error> { e })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
