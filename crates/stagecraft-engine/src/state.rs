//! Per-session state: the data and invariants one orchestrator owns.
//!
//! All fields live behind a single per-session mutex held only for short,
//! non-blocking sections — never across collaborator I/O. Cross-task
//! decisions reduce to one comparison: does the task's captured epoch match
//! the session's current epoch?

use std::time::Instant;

use serde::{Deserialize, Serialize};

use stagecraft_core::dialogue::{render_transcript, DialogueEntry, DialogueKind};
use stagecraft_store::{SessionMeta, StoredMessage};

/// Session lifecycle phase.
///
/// Replaces the boolean sprawl of earlier designs: `processing` is
/// `Processing | Cancelling`, `story_completed` is `Completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No turn running; the session can accept work.
    Idle,
    /// A turn is actively running.
    Processing,
    /// An interruption is preempting the running turn.
    Cancelling,
    /// All objectives met. Terminal.
    Completed,
}

/// The state of one narrative session.
#[derive(Debug)]
pub struct SessionState {
    /// Ordered objectives; immutable after load.
    pub objectives: Vec<String>,
    /// Current objective index; monotonic non-decreasing.
    pub objective_index: usize,
    /// Full transcript; append-only within an epoch.
    pub transcript: Vec<DialogueEntry>,
    /// Prompt context window; cleared when a scene summary replaces it.
    pub context: String,
    /// Scene summary standing in for older transcript context.
    pub background_summary: String,
    /// Last unsatisfied-objective reason; cleared on completion.
    pub failure_reason: String,
    /// Outline parked for a re-planning-free retry.
    pub retry_outline: Option<String>,
    /// Cancellation epoch; every preemption increments it.
    pub epoch: u64,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Next transcript sequence number.
    pub next_sequence: u64,
    /// When the running turn entered `Processing`.
    pub processing_since: Option<Instant>,
    /// Last public operation on this session.
    pub last_activity: Instant,
}

impl SessionState {
    /// Fresh state for a new session.
    #[must_use]
    pub fn new(objectives: Vec<String>, background: String) -> Self {
        let phase = if objectives.is_empty() {
            Phase::Completed
        } else {
            Phase::Idle
        };
        Self {
            objectives,
            objective_index: 0,
            transcript: Vec::new(),
            context: String::new(),
            background_summary: background,
            failure_reason: String::new(),
            retry_outline: None,
            epoch: 0,
            phase,
            next_sequence: 0,
            processing_since: None,
            last_activity: Instant::now(),
        }
    }

    /// Rehydrate from persisted metadata and transcript.
    #[must_use]
    pub fn from_parts(
        objectives: Vec<String>,
        background: String,
        meta: Option<&SessionMeta>,
        messages: &[StoredMessage],
    ) -> Self {
        let mut state = Self::new(objectives, background);

        if let Some(meta) = meta {
            state.objective_index = meta.objective_index.min(state.objectives.len());
            if !meta.background_summary.is_empty() {
                state.background_summary = meta.background_summary.clone();
            }
            state.failure_reason = meta.failure_reason.clone();
            if meta.completed || state.objective_index >= state.objectives.len() {
                state.phase = Phase::Completed;
            }
        }

        for message in messages {
            state.transcript.push(message.to_entry());
        }
        state.transcript.sort_by_key(|e| e.sequence);
        state.context = render_transcript(&state.transcript);
        state.next_sequence = state
            .transcript
            .last()
            .map_or(0, |e| e.sequence + 1);
        state
    }

    /// The objective now in play, or `None` when all are met.
    #[must_use]
    pub fn current_objective(&self) -> Option<&str> {
        self.objectives.get(self.objective_index).map(String::as_str)
    }

    /// Whether a turn currently owns the session.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        matches!(self.phase, Phase::Processing | Phase::Cancelling)
    }

    /// Whether the story finished.
    #[must_use]
    pub fn story_completed(&self) -> bool {
        matches!(self.phase, Phase::Completed)
    }

    /// Append a line to the transcript and context window, assigning the
    /// next sequence number.
    pub fn push_entry(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        kind: DialogueKind,
    ) -> DialogueEntry {
        let entry = DialogueEntry {
            role: role.into(),
            content: content.into(),
            kind,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let line = entry.speaker_line();
        if self.context.is_empty() {
            self.context = line;
        } else {
            self.context.push('\n');
            self.context.push_str(&line);
        }
        self.transcript.push(entry.clone());
        entry
    }

    /// Replace the context window with a scene summary.
    pub fn apply_summary(&mut self, summary: &str) {
        if summary.is_empty() {
            return;
        }
        self.background_summary = summary.to_owned();
        self.context.clear();
    }

    /// Durable metadata snapshot.
    #[must_use]
    pub fn meta(&self) -> SessionMeta {
        SessionMeta {
            objective_index: self.objective_index,
            completed: self.story_completed(),
            background_summary: self.background_summary.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }

    /// Record a public operation for the idle sweep.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
