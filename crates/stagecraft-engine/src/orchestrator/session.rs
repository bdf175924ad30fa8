//! `SessionOrchestrator` — one session's turn state machine.
//!
//! Exactly one orchestrator owns each [`SessionState`]. Turns run as async
//! tasks; the per-session mutex is held only for short mutation windows,
//! never across collaborator I/O. Preemption happens in a fixed order:
//!
//! 1. the epoch counter is bumped (stale work becomes invisible), then
//! 2. the cancellation token is fired (pending pacing sleeps wake), then
//! 3. the processing flag is forced clear (the session accepts new work).
//!
//! A stale task discovers the bump at its next checkpoint and exits without
//! touching state. It never resurrects the processing flag because every
//! finishing path re-verifies the epoch under the state lock first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stagecraft_core::dialogue::{render_transcript, DialogueEntry, DialogueKind};
use stagecraft_core::events::{status_event, EventBase, StageEvent};
use stagecraft_core::ids::SessionId;
use stagecraft_protocol::{Director, Performer, SceneContext};
use stagecraft_store::TranscriptStore;

use crate::cast::Cast;
use crate::emitter::{EventEmitter, EventSink};
use crate::errors::TurnStatus;
use crate::orchestrator::turn;
use crate::persister::MessagePersister;
use crate::state::{Phase, SessionState};
use crate::types::{EngineConfig, SessionSnapshot, TurnResult};

/// Captured inputs for one turn, taken under the gate lock.
pub(crate) struct TurnPlan {
    /// Epoch the turn runs under; checked at every checkpoint.
    pub epoch: u64,
    /// The objective this turn advances.
    pub objective: String,
    /// Failure reason from a previously unsatisfied check.
    pub failure_reason: String,
    /// Parked outline from an unsatisfied check; skips re-planning.
    pub retry_outline: Option<String>,
}

/// One session's turn state machine.
pub struct SessionOrchestrator {
    session_id: SessionId,
    director: Arc<dyn Director>,
    performers: HashMap<String, Arc<dyn Performer>>,
    player_name: String,
    config: EngineConfig,
    // Lock order: `state` before `cancel`. Never hold either across an await.
    state: Mutex<SessionState>,
    cancel: Mutex<CancellationToken>,
    emitter: EventEmitter,
    persister: MessagePersister,
    turn_tx: mpsc::Sender<()>,
    worker_stop: CancellationToken,
    stopped: AtomicBool,
    weak_self: Weak<SessionOrchestrator>,
}

impl SessionOrchestrator {
    /// Construct an orchestrator and start its continuation worker.
    pub fn new(
        session_id: SessionId,
        cast: &Cast,
        state: SessionState,
        store: Arc<dyn TranscriptStore>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (turn_tx, turn_rx) = mpsc::channel(config.continuation_queue);
        let worker_stop = CancellationToken::new();
        let persister = MessagePersister::new(store, session_id.clone());

        Arc::new_cyclic(|weak: &Weak<Self>| {
            drop(tokio::spawn(continuation_worker(
                weak.clone(),
                turn_rx,
                worker_stop.clone(),
            )));
            Self {
                session_id,
                director: cast.director.clone(),
                performers: cast.performer_map(),
                player_name: cast.player_name.clone(),
                config,
                state: Mutex::new(state),
                cancel: Mutex::new(CancellationToken::new()),
                emitter: EventEmitter::default(),
                persister,
                turn_tx,
                worker_stop: worker_stop.clone(),
                stopped: AtomicBool::new(false),
                weak_self: weak.clone(),
            }
        })
    }

    // ── Public contract ────────────────────────────────────────────────

    /// Run one scene turn.
    ///
    /// Returns immediately with `Busy` if another task owns the session and
    /// `Complete` if the story finished — both without side effects.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn advance_turn(&self) -> TurnResult {
        if self.stopped.load(Ordering::SeqCst) {
            return TurnResult::stopped();
        }

        // Gate: claim the session or return without touching anything.
        let plan = {
            let mut state = self.state.lock();
            state.touch();
            match state.phase {
                Phase::Completed => return TurnResult::complete(),
                Phase::Processing | Phase::Cancelling => {
                    debug!(session_id = %self.session_id, "turn rejected: already processing");
                    return TurnResult::busy();
                }
                Phase::Idle => {}
            }
            let Some(objective) = state.current_objective().map(ToOwned::to_owned) else {
                state.phase = Phase::Completed;
                self.emitter
                    .emit(status_event(&self.session_id, state.epoch, "story complete"));
                return TurnResult::complete();
            };
            state.phase = Phase::Processing;
            state.processing_since = Some(Instant::now());
            TurnPlan {
                epoch: state.epoch,
                objective,
                failure_reason: state.failure_reason.clone(),
                retry_outline: state.retry_outline.clone(),
            }
        };

        let result = turn::run_turn(self, plan).await;
        if result.status == TurnStatus::Cancelled {
            debug!(session_id = %self.session_id, "turn preempted; results discarded");
        }
        result
    }

    /// Preempt any in-flight turn, append the player's line, and trigger a
    /// reactive turn under the new epoch.
    ///
    /// Returns acceptance — the narrative reaction happens asynchronously.
    #[instrument(skip(self, player_input), fields(session_id = %self.session_id))]
    pub async fn interrupt(&self, player_input: &str) -> TurnResult {
        if self.stopped.load(Ordering::SeqCst) {
            return TurnResult::stopped();
        }

        let entry = {
            let mut state = self.state.lock();
            state.touch();
            if state.story_completed() {
                return TurnResult::complete();
            }

            // Epoch bump FIRST: all stale emissions and mutations die here.
            state.epoch += 1;
            let epoch = state.epoch;
            if matches!(state.phase, Phase::Processing) {
                state.phase = Phase::Cancelling;
            }

            // Cancellation signal: wakes any pacing sleep immediately.
            self.replace_cancel_token();

            // Force processing observably false. The preempted task sees the
            // epoch mismatch at its next checkpoint and exits silently.
            state.phase = Phase::Idle;
            state.processing_since = None;
            // Player input invalidates any parked outline — re-plan.
            state.retry_outline = None;

            self.emitter
                .emit(status_event(&self.session_id, epoch, "player interrupts"));
            let entry = state.push_entry(
                self.player_name.clone(),
                player_input,
                DialogueKind::Player,
            );
            self.emitter.emit(StageEvent::Dialogue {
                base: EventBase::now(&self.session_id, epoch),
                entry: entry.clone(),
            });
            entry
        };

        self.persister.append_fire_and_forget(entry.clone());

        // React immediately on a fresh task; the continuation worker may
        // still be draining the preempted turn.
        if let Some(orch) = self.weak_self.upgrade() {
            drop(tokio::spawn(async move {
                let _ = orch.advance_turn().await;
            }));
        }

        info!(session_id = %self.session_id, "interruption accepted");
        TurnResult {
            status: TurnStatus::Success,
            message: "player input accepted".into(),
            dialogue: vec![entry],
            objective: None,
        }
    }

    /// Thread-safe, read-only snapshot for API responses.
    pub fn get_state(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            objective_index: state.objective_index,
            total_objectives: state.objectives.len(),
            current_objective: state.current_objective().map(ToOwned::to_owned),
            failure_reason: state.failure_reason.clone(),
            phase: state.phase,
            epoch: state.epoch,
            processing: state.is_processing(),
            story_completed: state.story_completed(),
            transcript_len: state.transcript.len(),
        }
    }

    /// Mark the session non-schedulable and release pending timers.
    /// Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state.lock();
            // Invalidate in-flight work exactly like a preemption.
            state.epoch += 1;
            self.replace_cancel_token();
            if state.is_processing() {
                state.phase = Phase::Idle;
                state.processing_since = None;
            }
        }
        self.worker_stop.cancel();
        info!(session_id = %self.session_id, "session stopped");
    }

    /// Recover a turn that has been processing longer than `max_processing`.
    ///
    /// Treated identically to an interruption's preemption, without player
    /// input: bump the epoch, fire the cancellation signal, clear the flag.
    /// The hung task's eventual checkpoint discards its results.
    pub fn recover_if_stuck(&self, max_processing: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.is_processing() {
            return false;
        }
        let Some(since) = state.processing_since else {
            return false;
        };
        if since.elapsed() < max_processing {
            return false;
        }

        state.epoch += 1;
        let epoch = state.epoch;
        self.replace_cancel_token();
        state.phase = Phase::Idle;
        state.processing_since = None;
        state.retry_outline = None;

        warn!(session_id = %self.session_id, "recovered stuck turn");
        self.emitter.emit(status_event(
            &self.session_id,
            epoch,
            "recovered a stuck turn; the session accepts input again",
        ));
        true
    }

    // ── Observation ────────────────────────────────────────────────────

    /// Subscribe to this session's events.
    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.emitter.subscribe()
    }

    /// Attach an external sink if none is attached yet.
    pub fn attach_sink_if_absent(&self, sink: Arc<dyn EventSink>) -> bool {
        self.emitter.attach_sink_if_absent(sink)
    }

    /// The session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Whether `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Last public operation on this session.
    pub fn last_activity(&self) -> Instant {
        self.state.lock().last_activity
    }

    /// Wait for queued transcript writes to land (test support).
    pub async fn flush_pending_writes(&self) {
        self.persister.flush().await;
    }

    // ── Turn internals ─────────────────────────────────────────────────

    /// Run `f` under the state lock iff `epoch` is still current.
    pub(crate) fn guarded<R>(
        &self,
        epoch: u64,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        Some(f(&mut state))
    }

    /// Scene context for collaborator calls, iff `epoch` is current.
    pub(crate) fn scene_context(&self, epoch: u64) -> Option<SceneContext> {
        self.guarded(epoch, |state| {
            SceneContext::new(state.background_summary.clone(), state.context.clone())
        })
    }

    /// Full transcript rendering for objective checks, iff `epoch` is current.
    pub(crate) fn full_transcript(&self, epoch: u64) -> Option<String> {
        self.guarded(epoch, |state| render_transcript(&state.transcript))
    }

    /// Commit a performed line: append, emit typing-idle and dialogue
    /// atomically under the state lock. Returns `None` when stale.
    pub(crate) fn commit_performed_line(
        &self,
        epoch: u64,
        role: &str,
        content: &str,
        kind: DialogueKind,
    ) -> Option<DialogueEntry> {
        self.guarded(epoch, |state| {
            let entry = state.push_entry(role, content, kind);
            self.emitter.emit(StageEvent::TypingIndicator {
                base: EventBase::now(&self.session_id, epoch),
                role: role.to_owned(),
                status: stagecraft_core::events::TypingStatus::Idle,
            });
            self.emitter.emit(StageEvent::Dialogue {
                base: EventBase::now(&self.session_id, epoch),
                entry: entry.clone(),
            });
            entry
        })
    }

    /// Emit an event iff `epoch` is current. Returns whether it emitted.
    pub(crate) fn emit_if_current(
        &self,
        epoch: u64,
        make_event: impl FnOnce() -> StageEvent,
    ) -> bool {
        self.guarded(epoch, |_| self.emitter.emit(make_event()))
            .is_some()
    }

    /// Abort the current turn: return to `Idle`, surface an error event.
    /// No-op when stale — a preemption already reclaimed the session.
    pub(crate) fn abort_turn(&self, epoch: u64, message: &str) {
        let aborted = self.guarded(epoch, |state| {
            state.phase = Phase::Idle;
            state.processing_since = None;
            self.emitter.emit(stagecraft_core::events::error_event(
                &self.session_id,
                epoch,
                message,
            ));
        });
        if aborted.is_some() {
            warn!(session_id = %self.session_id, message, "turn aborted");
        }
    }

    /// Queue a follow-up turn on the continuation worker.
    pub(crate) fn schedule_continuation(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self.turn_tx.try_send(()).is_err() {
            debug!(session_id = %self.session_id, "continuation queue full; follow-up dropped");
        }
    }

    /// The cancellation token for the current epoch.
    pub(crate) fn current_cancel(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Swap in a fresh token and fire the old one. Caller holds `state`.
    fn replace_cancel_token(&self) {
        let old = {
            let mut token = self.cancel.lock();
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        old.cancel();
    }

    pub(crate) fn director(&self) -> &Arc<dyn Director> {
        &self.director
    }

    pub(crate) fn performer(&self, role: &str) -> Option<Arc<dyn Performer>> {
        self.performers.get(role).cloned()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn persister(&self) -> &MessagePersister {
        &self.persister
    }

    pub(crate) fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

/// Single-owner continuation loop: follow-up turns run here, one at a time,
/// instead of spawning a fresh task per scheduled turn.
async fn continuation_worker(
    weak: Weak<SessionOrchestrator>,
    mut rx: mpsc::Receiver<()>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            req = rx.recv() => {
                if req.is_none() {
                    break;
                }
                let Some(orch) = weak.upgrade() else { break };
                let result = orch.advance_turn().await;
                debug!(
                    session_id = %orch.session_id(),
                    status = %result.status,
                    "continuation turn finished"
                );
            }
        }
    }
}
