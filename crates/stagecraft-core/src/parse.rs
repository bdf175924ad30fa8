//! Lenient parsing for model-produced JSON.
//!
//! Director backends return JSON wrapped in markdown fences, prefixed with a
//! stray `json` language line, or carrying trailing commas. [`clean_json`]
//! normalizes those artifacts so the typed structures can deserialize;
//! [`parse_lenient`] combines cleanup and deserialization with a warning log
//! on failure.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([\]}])").expect("static regex"))
}

/// Strip markdown fences, a `json` prefix line, and trailing commas from a
/// JSON string produced by a language model.
#[must_use]
pub fn clean_json(raw: &str) -> String {
    let mut cleaned = raw.trim();

    // Remove markdown fences if present.
    if cleaned.starts_with("```") && cleaned.ends_with("```") && cleaned.len() >= 6 {
        cleaned = cleaned
            .trim_start_matches('`')
            .trim_end_matches('`')
            .trim();
    }

    // Drop a leading `json` language-tag line.
    let cleaned = match cleaned.split_once('\n') {
        Some((first, rest)) if first.trim().eq_ignore_ascii_case("json") => rest,
        _ => cleaned,
    };

    // Remove trailing commas before a closing brace/bracket.
    trailing_comma_re()
        .replace_all(cleaned.trim(), "$1")
        .into_owned()
}

/// Clean and deserialize a model response into `T`.
///
/// Logs a warning with a short preview on failure; the caller decides whether
/// a parse failure aborts the turn.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let cleaned = clean_json(raw);
    serde_json::from_str(&cleaned).inspect_err(|e| {
        warn!(
            error = %e,
            preview = cleaned.chars().take(120).collect::<String>(),
            "failed to parse model JSON"
        );
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
