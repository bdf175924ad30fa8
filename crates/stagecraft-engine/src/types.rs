//! Engine configuration and result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use stagecraft_core::dialogue::DialogueEntry;
use stagecraft_core::events::ObjectiveProgress;
use stagecraft_core::ids::SessionId;
use stagecraft_settings::StageSettings;

use crate::errors::TurnStatus;
use crate::state::Phase;

/// Result of one `advance_turn` or `interrupt` call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    /// Outcome classification.
    pub status: TurnStatus,
    /// Human-readable summary.
    pub message: String,
    /// Lines committed to the transcript by this call.
    pub dialogue: Vec<DialogueEntry>,
    /// Objective progress, when a check ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<ObjectiveProgress>,
}

impl TurnResult {
    /// Another task owns the session.
    #[must_use]
    pub fn busy() -> Self {
        Self {
            status: TurnStatus::Busy,
            message: "already processing".into(),
            ..Default::default()
        }
    }

    /// The story already finished.
    #[must_use]
    pub fn complete() -> Self {
        Self {
            status: TurnStatus::Complete,
            message: "story already complete".into(),
            ..Default::default()
        }
    }

    /// The turn was preempted and exited silently.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            status: TurnStatus::Cancelled,
            message: "preempted by interruption".into(),
            ..Default::default()
        }
    }

    /// The turn aborted on an error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Error,
            message: message.into(),
            ..Default::default()
        }
    }

    /// The session was stopped.
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            status: TurnStatus::Stopped,
            message: "session stopped".into(),
            ..Default::default()
        }
    }
}

/// Read-only snapshot of session state for API responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session id.
    pub session_id: SessionId,
    /// Current objective index.
    pub objective_index: usize,
    /// Total objectives.
    pub total_objectives: usize,
    /// The objective now in play, if any remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_objective: Option<String>,
    /// Last unsatisfied-objective reason.
    pub failure_reason: String,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Current cancellation epoch.
    pub epoch: u64,
    /// Whether a turn is actively running.
    pub processing: bool,
    /// Whether the story finished.
    pub story_completed: bool,
    /// Number of transcript lines.
    pub transcript_len: usize,
}

/// Dialogue pacing: a readability throttle proportional to line length.
#[derive(Clone, Copy, Debug)]
pub struct PacingConfig {
    /// Whether pacing delays are applied.
    pub enabled: bool,
    /// Base delay per line.
    pub base: Duration,
    /// Additional delay per character.
    pub per_char: Duration,
    /// Upper bound on a single delay.
    pub max: Duration,
}

impl PacingConfig {
    /// Pacing disabled entirely (tests).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            base: Duration::ZERO,
            per_char: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay before committing a line of `len` characters.
    #[must_use]
    pub fn delay_for(&self, len: usize) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let scaled = self.per_char.saturating_mul(u32::try_from(len).unwrap_or(u32::MAX));
        (self.base + scaled).min(self.max)
    }
}

/// Engine-wide configuration, derived from settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Pacing throttle.
    pub pacing: PacingConfig,
    /// Capacity of the per-session continuation queue.
    pub continuation_queue: usize,
    /// Idle time before a clientless session is evicted.
    pub max_idle: Duration,
    /// Processing time before a turn is considered stuck.
    pub max_processing: Duration,
    /// Interval between maintenance sweeps.
    pub sweep_interval: Duration,
    /// Maximum number of concurrently live sessions.
    pub max_concurrent_sessions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&StageSettings::default())
    }
}

impl From<&StageSettings> for EngineConfig {
    fn from(settings: &StageSettings) -> Self {
        Self {
            pacing: PacingConfig {
                enabled: settings.pacing.enabled,
                base: Duration::from_millis(settings.pacing.base_ms),
                per_char: Duration::from_millis(settings.pacing.per_char_ms),
                max: Duration::from_millis(settings.pacing.max_ms),
            },
            continuation_queue: settings.engine.continuation_queue.max(1),
            max_idle: Duration::from_millis(settings.engine.max_idle_ms),
            max_processing: Duration::from_millis(settings.engine.max_processing_ms),
            sweep_interval: Duration::from_millis(settings.engine.sweep_interval_ms),
            max_concurrent_sessions: settings.engine.max_concurrent_sessions,
        }
    }
}

impl EngineConfig {
    /// Test configuration: no pacing, tight timeouts.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            pacing: PacingConfig::disabled(),
            continuation_queue: 4,
            max_idle: Duration::from_millis(200),
            max_processing: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(50),
            max_concurrent_sessions: 64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
