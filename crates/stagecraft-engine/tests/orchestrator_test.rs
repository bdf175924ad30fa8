//! Orchestrator behavior under concurrency, interruption, and failure.
//!
//! Stub collaborators are deterministic and, where an interleaving matters,
//! gated on semaphores so the tests never depend on wall-clock timing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use stagecraft_core::dialogue::DialogueKind;
use stagecraft_core::events::StageEvent;
use stagecraft_core::ids::SessionId;
use stagecraft_engine::{
    Cast, EngineConfig, EventSink, Phase, SessionOrchestrator, SessionState, TurnStatus,
};
use stagecraft_protocol::{
    Director, ObjectiveCheck, Performer, ProtocolError, ProtocolResult, SceneContext, ScenePlan,
    ScriptStep, TurnScript,
};
use stagecraft_store::{MemoryTranscriptStore, TranscriptStore};

// ─────────────────────────────────────────────────────────────────────────────
// Stub collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic director. Scripts the same roles every turn; objective
/// checks pop from a queue and default to `completed: true` once drained.
struct StubDirector {
    script_roles: Vec<String>,
    checks: Mutex<VecDeque<ObjectiveCheck>>,
    outline_calls: AtomicUsize,
    script_calls: AtomicUsize,
    /// Outline call number (1-based) that must acquire a permit first.
    outline_gate: Option<(Arc<Semaphore>, usize)>,
    /// Script call number (1-based) that fails with a backend error.
    fail_script_on: Option<usize>,
}

impl StubDirector {
    fn new(script_roles: &[&str]) -> Self {
        Self {
            script_roles: script_roles.iter().map(ToString::to_string).collect(),
            checks: Mutex::new(VecDeque::new()),
            outline_calls: AtomicUsize::new(0),
            script_calls: AtomicUsize::new(0),
            outline_gate: None,
            fail_script_on: None,
        }
    }

    fn with_checks(self, checks: &[(bool, &str)]) -> Self {
        *self.checks.lock() = checks
            .iter()
            .map(|(completed, reason)| ObjectiveCheck {
                completed: *completed,
                reason: (*reason).to_string(),
            })
            .collect();
        self
    }

    fn with_outline_gate(mut self, gate: Arc<Semaphore>, call: usize) -> Self {
        self.outline_gate = Some((gate, call));
        self
    }

    fn with_script_failure_on(mut self, call: usize) -> Self {
        self.fail_script_on = Some(call);
        self
    }
}

#[async_trait]
impl Director for StubDirector {
    async fn generate_outline(
        &self,
        _context: &SceneContext,
        objective: &str,
        _failure_reason: &str,
    ) -> ProtocolResult<ScenePlan> {
        let n = self.outline_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((gate, call)) = &self.outline_gate {
            if n == *call {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
        }
        Ok(ScenePlan {
            previous_outline: format!("summary-{n}"),
            new_outline: serde_json::Value::String(format!("outline-{n} toward '{objective}'")),
        })
    }

    async fn generate_turn_script(
        &self,
        _context: &SceneContext,
        _outline: &str,
        _failure_reason: &str,
    ) -> ProtocolResult<TurnScript> {
        let n = self.script_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_script_on == Some(n) {
            return Err(ProtocolError::Backend {
                message: "upstream timeout".into(),
                retryable: true,
            });
        }
        Ok(TurnScript {
            steps: self
                .script_roles
                .iter()
                .enumerate()
                .map(|(i, role)| {
                    if role.eq_ignore_ascii_case("narration") {
                        ScriptStep {
                            role: role.clone(),
                            instruction: None,
                            content: Some(format!("scene-{n}-{i}")),
                        }
                    } else {
                        ScriptStep {
                            role: role.clone(),
                            instruction: Some(format!("beat-{n}-{i}")),
                            content: None,
                        }
                    }
                })
                .collect(),
        })
    }

    async fn check_objective(
        &self,
        _transcript: &str,
        _objective: &str,
    ) -> ProtocolResult<ObjectiveCheck> {
        Ok(self.checks.lock().pop_front().unwrap_or(ObjectiveCheck {
            completed: true,
            reason: "the scene satisfied it".into(),
        }))
    }
}

/// Deterministic performer; call N can be gated on a semaphore.
struct StubPerformer {
    name: String,
    calls: AtomicUsize,
    gate: Option<(Arc<Semaphore>, usize)>,
}

impl StubPerformer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn with_gate(mut self, gate: Arc<Semaphore>, call: usize) -> Self {
        self.gate = Some((gate, call));
        self
    }
}

#[async_trait]
impl Performer for StubPerformer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, _context: &SceneContext, instruction: &str) -> ProtocolResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((gate, call)) = &self.gate {
            if n == *call {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
        }
        Ok(format!("reply-{n} to {instruction}"))
    }
}

/// Sink recording every delivered event in order.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingSink {
    fn len(&self) -> usize {
        self.events.lock().len()
    }

    fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &StageEvent) {
        self.events.lock().push(event.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct Harness {
    orch: Arc<SessionOrchestrator>,
    store: Arc<MemoryTranscriptStore>,
    sink: Arc<RecordingSink>,
    director: Arc<StubDirector>,
}

fn make_harness(
    objectives: &[&str],
    director: StubDirector,
    performers: Vec<StubPerformer>,
) -> Harness {
    let store = Arc::new(MemoryTranscriptStore::new());
    let sink = Arc::new(RecordingSink::default());
    let director = Arc::new(director);
    let cast = Cast {
        director: director.clone(),
        performers: performers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn Performer>)
            .collect(),
        player_name: "Alex".into(),
        objectives: objectives.iter().map(ToString::to_string).collect(),
        background: "the pier at dusk".into(),
    };
    let state = SessionState::new(cast.objectives.clone(), cast.background.clone());
    let orch = SessionOrchestrator::new(
        SessionId::from("s1"),
        &cast,
        state,
        store.clone() as Arc<dyn TranscriptStore>,
        EngineConfig::for_tests(),
    );
    assert!(orch.attach_sink_if_absent(sink.clone()));
    Harness {
        orch,
        store,
        sink,
        director,
    }
}

async fn wait_story_completed(orch: &Arc<SessionOrchestrator>) {
    for _ in 0..5_000 {
        if orch.get_state().story_completed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("story did not complete: {:?}", orch.get_state());
}

async fn wait_idle(orch: &Arc<SessionOrchestrator>) {
    for _ in 0..5_000 {
        if !orch.get_state().processing {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("session never went idle: {:?}", orch.get_state());
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario A + B: objectives advance, follow-ups auto-schedule, completion
// is terminal.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn objectives_advance_to_completion() {
    let h = make_harness(
        &["meet the stranger", "solve the riddle"],
        StubDirector::new(&["Mira", "Narration"]),
        vec![StubPerformer::new("Mira")],
    );

    // Scenario A: first turn completes the first objective.
    let result = h.orch.advance_turn().await;
    assert_eq!(result.status, TurnStatus::Success);
    assert_eq!(result.dialogue.len(), 2);
    let progress = result.objective.expect("objective check ran");
    assert!(progress.completed);
    assert_eq!(progress.index, 1);
    assert_eq!(progress.total, 2);
    assert!(!progress.story_completed);

    // Scenario B: the auto-scheduled follow-up finishes the story without
    // another external call.
    wait_story_completed(&h.orch).await;
    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.objective_index, 2);
    assert!(snapshot.story_completed);
    assert_eq!(snapshot.phase, Phase::Completed);

    // Completed is terminal: no further turns, no side effects.
    let after = h.orch.advance_turn().await;
    assert_eq!(after.status, TurnStatus::Complete);
    assert!(after.dialogue.is_empty());
    let interrupted = h.orch.interrupt("anyone there?").await;
    assert_eq!(interrupted.status, TurnStatus::Complete);
    assert_eq!(h.orch.get_state().transcript_len, 4);

    // Transcript persisted in order.
    h.orch.flush_pending_writes().await;
    let messages = h.store.load_messages(&SessionId::from("s1")).unwrap();
    assert_eq!(messages.len(), 4);
    assert!(messages.iter().enumerate().all(|(i, m)| m.sequence == i as u64));
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutual exclusion: N concurrent advance_turn calls, one runs, the rest are
// rejected without mutating anything.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_turns_yield_one_execution() {
    let gate = Arc::new(Semaphore::new(0));
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira"]).with_outline_gate(gate.clone(), 1),
        vec![StubPerformer::new("Mira")],
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orch = h.orch.clone();
        handles.push(tokio::spawn(async move { orch.advance_turn().await }));
    }

    // Let every task reach the gate or the busy rejection, then release the
    // one holding the session.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    gate.add_permits(1);

    let mut success = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap().status {
            TurnStatus::Success => success += 1,
            TurnStatus::Busy => busy += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(success, 1, "exactly one task may execute");
    assert_eq!(busy, 7);

    // Exactly one turn's worth of lines, no duplicates.
    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.transcript_len, 1);
    assert!(snapshot.story_completed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario C + cancellation safety: an interrupt preempts the in-flight
// script, the player line lands right after the already-committed lines, and
// no pre-interrupt epoch is ever observed again.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn interrupt_preempts_in_flight_turn() {
    let gate = Arc::new(Semaphore::new(0));
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira", "Mira", "Mira"]),
        // Call 2 (the second script step) blocks until we release it.
        vec![StubPerformer::new("Mira").with_gate(gate.clone(), 2)],
    );

    let mut rx = h.orch.subscribe();
    let orch = h.orch.clone();
    let turn = tokio::spawn(async move { orch.advance_turn().await });

    // Wait for the first committed line; the second step is now blocked.
    loop {
        match rx.recv().await.unwrap() {
            StageEvent::Dialogue { entry, .. } => {
                assert_eq!(entry.sequence, 0);
                break;
            }
            _ => continue,
        }
    }

    let result = h.orch.interrupt("Where did she go?").await;
    assert_eq!(result.status, TurnStatus::Success);
    assert_eq!(result.dialogue.len(), 1);
    // The player line lands immediately after the already-emitted lines.
    assert_eq!(result.dialogue[0].sequence, 1);
    assert_eq!(result.dialogue[0].kind, DialogueKind::Player);
    let sink_mark = h.sink.len();

    // Release the blocked performer; its commit must be discarded.
    gate.add_permits(1);
    let preempted = turn.await.unwrap();
    assert_eq!(preempted.status, TurnStatus::Cancelled);

    // The reactive turn runs under the new epoch and finishes the story.
    wait_story_completed(&h.orch).await;

    // No dialogue or typing event after the interrupt carries epoch 0.
    for event in &h.sink.events()[sink_mark..] {
        if matches!(
            event,
            StageEvent::Dialogue { .. } | StageEvent::TypingIndicator { .. }
        ) {
            assert!(
                event.epoch() >= 1,
                "stale-epoch event observed after interrupt: {event:?}"
            );
        }
    }

    // Transcript: first committed line, player line, then reactive lines.
    // The blocked performer's late reply ("reply-2 ...") never lands.
    h.orch.flush_pending_writes().await;
    let messages = h.store.load_messages(&SessionId::from("s1")).unwrap();
    assert!(messages[0].content.starts_with("reply-1"));
    assert_eq!(messages[1].content, "Where did she go?");
    assert_eq!(messages[1].role, "Alex");
    assert!(
        messages.iter().all(|m| !m.content.starts_with("reply-2")),
        "preempted line must be discarded"
    );
    assert!(messages.len() >= 5, "reactive turn should add its own lines");
}

// ─────────────────────────────────────────────────────────────────────────────
// Objective monotonicity across failed checks and retries.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn objective_index_is_monotonic_across_retries() {
    let h = make_harness(
        &["meet the stranger", "solve the riddle"],
        StubDirector::new(&["Mira"]).with_checks(&[
            (false, "the stranger has not appeared"),
            (true, "they spoke at last"),
            (false, "the riddle went unanswered"),
            (true, "answered in full"),
        ]),
        vec![StubPerformer::new("Mira")],
    );

    let mut rx = h.orch.subscribe();
    let first = h.orch.advance_turn().await;
    assert_eq!(first.status, TurnStatus::Success);
    assert!(!first.objective.unwrap().completed);

    wait_story_completed(&h.orch).await;

    let mut last_index = 0;
    let mut final_progress = None;
    while let Ok(event) = rx.try_recv() {
        if let StageEvent::ObjectiveStatus { progress, .. } = event {
            assert!(
                progress.index >= last_index,
                "objective index regressed: {} -> {}",
                last_index,
                progress.index
            );
            last_index = progress.index;
            final_progress = Some(progress);
        }
    }
    let final_progress = final_progress.expect("objective events observed");
    assert_eq!(final_progress.index, 2);
    assert!(final_progress.story_completed);

    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.objective_index, snapshot.total_objectives);

    // Each failed check parked its outline: four scripts ran (two turns,
    // two retries) but the director only planned twice.
    assert_eq!(h.director.script_calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.director.outline_calls.load(Ordering::SeqCst), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Deterministic replay: a fixed call script produces a byte-identical
// transcript across runs.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fixed_call_script_replays_identically() {
    async fn run_once() -> String {
        let h = make_harness(
            &["meet the stranger", "solve the riddle"],
            StubDirector::new(&["Mira", "Narration"]).with_checks(&[
                (false, "not yet"),
                (true, "done"),
                (true, "done"),
            ]),
            vec![StubPerformer::new("Mira")],
        );

        let accepted = h.orch.interrupt("Hello? Is anyone out there?").await;
        assert_eq!(accepted.status, TurnStatus::Success);
        wait_story_completed(&h.orch).await;

        h.orch.flush_pending_writes().await;
        let messages = h.store.load_messages(&SessionId::from("s1")).unwrap();
        messages
            .iter()
            .map(|m| format!("{}|{}|{}|{}", m.sequence, m.role, m.kind.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    let first = run_once().await;
    let second = run_once().await;
    assert!(!first.is_empty());
    assert_eq!(first, second, "replay must be byte-identical");
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure semantics: planning errors abort the turn, leave state untouched,
// and schedule nothing; a later call resumes.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn planning_error_aborts_without_retry() {
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira"]).with_script_failure_on(1),
        vec![StubPerformer::new("Mira")],
    );

    let result = h.orch.advance_turn().await;
    assert_eq!(result.status, TurnStatus::Error);
    assert!(result.dialogue.is_empty());

    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.objective_index, 0);
    assert_eq!(snapshot.transcript_len, 0);

    // No retry was scheduled: the session stays exactly as it is.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(h.orch.get_state().transcript_len, 0);

    // An error event reached the sink.
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, StageEvent::Error { .. })));

    // A manual retrigger resumes; the stub only fails the first script call.
    let retry = h.orch.advance_turn().await;
    assert_eq!(retry.status, TurnStatus::Success);
    assert!(h.orch.get_state().story_completed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence failures are warnings: the turn succeeds and in-memory state
// stays authoritative.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn persistence_failure_does_not_fail_the_turn() {
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira"]),
        vec![StubPerformer::new("Mira")],
    );
    h.store.set_fail_writes(true);

    let result = h.orch.advance_turn().await;
    assert_eq!(result.status, TurnStatus::Success);

    h.orch.flush_pending_writes().await;
    assert_eq!(h.store.message_count(&SessionId::from("s1")), 0);

    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.transcript_len, 1);
    assert!(snapshot.story_completed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stuck recovery: the watchdog path invalidates the epoch; the hung task's
// late writes are discarded and cannot resurrect the processing flag.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stuck_recovery_discards_late_work() {
    let gate = Arc::new(Semaphore::new(0));
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira"]),
        // The first reply hangs until released — a stand-in for a hung
        // external call that never reaches a checkpoint.
        vec![StubPerformer::new("Mira").with_gate(gate.clone(), 1)],
    );

    let orch = h.orch.clone();
    let hung = tokio::spawn(async move { orch.advance_turn().await });

    // Wait until the turn owns the session.
    for _ in 0..5_000 {
        if h.orch.get_state().processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(h.orch.get_state().processing);

    // Watchdog: anything processing counts as stuck with a zero budget.
    assert!(h.orch.recover_if_stuck(Duration::ZERO));
    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.epoch, 1);

    // A second recovery finds nothing to do.
    assert!(!h.orch.recover_if_stuck(Duration::ZERO));

    // Release the hung task: its commit is stale and must vanish silently,
    // leaving the flag clear.
    gate.add_permits(1);
    let result = hung.await.unwrap();
    assert_eq!(result.status, TurnStatus::Cancelled);
    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.transcript_len, 0);

    // The recovery notice reached the sink as a status, not an error.
    assert!(h.sink.events().iter().any(
        |e| matches!(e, StageEvent::Status { message, .. } if message.contains("recovered"))
    ));

    // The session accepts work again.
    let next = h.orch.advance_turn().await;
    assert_eq!(next.status, TurnStatus::Success);
    wait_idle(&h.orch).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop: idempotent, terminal for scheduling, read path stays open.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_terminal() {
    let h = make_harness(
        &["escape the cellar"],
        StubDirector::new(&["Mira"]),
        vec![StubPerformer::new("Mira")],
    );

    h.orch.stop();
    h.orch.stop(); // second call is a no-op

    assert!(h.orch.is_stopped());
    assert_eq!(h.orch.advance_turn().await.status, TurnStatus::Stopped);
    assert_eq!(h.orch.interrupt("hello?").await.status, TurnStatus::Stopped);

    // get_state remains valid after stop.
    let snapshot = h.orch.get_state();
    assert_eq!(snapshot.transcript_len, 0);
    assert!(!snapshot.processing);
}

// ─────────────────────────────────────────────────────────────────────────────
// Rehydration: a session rebuilt from the store resumes objective progress
// and sequence numbering.
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rehydrated_session_resumes_sequence_and_progress() {
    let store = Arc::new(MemoryTranscriptStore::new());
    let sid = SessionId::from("s1");

    // Seed a prior life of the session.
    let _ = store
        .append_message(&sid, "Mira", "We meet at last.", DialogueKind::Actor, 0)
        .unwrap();
    let _ = store
        .append_message(&sid, "Alex", "Who are you?", DialogueKind::Player, 1)
        .unwrap();
    store
        .update_session_meta(
            &sid,
            &stagecraft_store::SessionMeta {
                objective_index: 1,
                completed: false,
                background_summary: "they met on the pier".into(),
                failure_reason: String::new(),
            },
        )
        .unwrap();

    let cast = Cast {
        director: Arc::new(StubDirector::new(&["Mira"])),
        performers: vec![Arc::new(StubPerformer::new("Mira")) as Arc<dyn Performer>],
        player_name: "Alex".into(),
        objectives: vec!["meet the stranger".into(), "solve the riddle".into()],
        background: "the pier at dusk".into(),
    };
    let meta = store.load_session_meta(&sid).unwrap();
    let messages = store.load_messages(&sid).unwrap();
    let state = SessionState::from_parts(
        cast.objectives.clone(),
        cast.background.clone(),
        meta.as_ref(),
        &messages,
    );
    let orch = SessionOrchestrator::new(
        sid.clone(),
        &cast,
        state,
        store.clone() as Arc<dyn TranscriptStore>,
        EngineConfig::for_tests(),
    );

    let snapshot = orch.get_state();
    assert_eq!(snapshot.objective_index, 1);
    assert_eq!(snapshot.current_objective.as_deref(), Some("solve the riddle"));
    assert_eq!(snapshot.transcript_len, 2);

    // New lines continue the persisted sequence.
    let result = orch.advance_turn().await;
    assert_eq!(result.status, TurnStatus::Success);
    orch.flush_pending_writes().await;
    let messages = store.load_messages(&sid).unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sequence, 2);
    assert!(orch.get_state().story_completed);
}
