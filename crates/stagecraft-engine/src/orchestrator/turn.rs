//! Turn runner — one scene turn: plan → script → perform → judge.
//!
//! Collaborator calls are uninterruptible from the engine's perspective;
//! cancellation takes effect at the checkpoints between them. Every
//! checkpoint is a `guarded` call that re-compares the turn's captured epoch
//! against the session's current epoch and exits silently on mismatch — the
//! central invariant that keeps a preempted turn from corrupting state.

use tracing::{debug, info, instrument};

use stagecraft_core::dialogue::{DialogueEntry, DialogueKind};
use stagecraft_core::events::{
    DirectorActivity, EventBase, ObjectiveProgress, StageEvent, TypingStatus,
};

use crate::errors::TurnStatus;
use crate::orchestrator::session::{SessionOrchestrator, TurnPlan};
use crate::state::Phase;
use crate::types::TurnResult;

/// Execute a single scene turn. The caller has already claimed the session
/// (`Phase::Processing`) and captured the plan under the gate lock.
#[instrument(skip_all, fields(session_id = %orch.session_id(), epoch = plan.epoch))]
pub(crate) async fn run_turn(orch: &SessionOrchestrator, plan: TurnPlan) -> TurnResult {
    let epoch = plan.epoch;
    let cancel = orch.current_cancel();

    // 1. Director starts planning.
    if !orch.emit_if_current(epoch, || StageEvent::DirectorStatus {
        base: EventBase::now(orch.session_id(), epoch),
        status: DirectorActivity::Directing,
        message: "director is directing".into(),
    }) {
        return TurnResult::cancelled();
    }

    // 2. Plan the scene — or reuse the parked outline from an unsatisfied
    //    check, skipping re-planning so the failure reason drives the script.
    let outline = if let Some(outline) = plan.retry_outline.clone() {
        debug!("reusing parked outline for retry");
        outline
    } else {
        let Some(context) = orch.scene_context(epoch) else {
            return TurnResult::cancelled();
        };
        let scene_plan = match orch
            .director()
            .generate_outline(&context, &plan.objective, &plan.failure_reason)
            .await
        {
            Ok(scene_plan) => scene_plan,
            Err(e) => {
                orch.abort_turn(epoch, &format!("outline generation failed: {e}"));
                return TurnResult::error(format!("outline generation failed: {e}"));
            }
        };

        // Checkpoint: apply the summary, replacing the context window so
        // prompt growth stays bounded. The new background reaches every
        // later collaborator call through `scene_context`.
        let applied = orch.guarded(epoch, |state| {
            state.apply_summary(&scene_plan.previous_outline);
        });
        if applied.is_none() {
            return TurnResult::cancelled();
        }
        scene_plan.outline_text()
    };

    // 3. Script the turn.
    let Some(context) = orch.scene_context(epoch) else {
        return TurnResult::cancelled();
    };
    let script = match orch
        .director()
        .generate_turn_script(&context, &outline, &plan.failure_reason)
        .await
    {
        Ok(script) => script,
        Err(e) => {
            orch.abort_turn(epoch, &format!("script generation failed: {e}"));
            return TurnResult::error(format!("script generation failed: {e}"));
        }
    };

    // 4. Director is done; performers take over.
    if !orch.emit_if_current(epoch, || StageEvent::DirectorStatus {
        base: EventBase::now(orch.session_id(), epoch),
        status: DirectorActivity::Idle,
        message: String::new(),
    }) {
        return TurnResult::cancelled();
    }

    // 5. Perform each step, committing lines between checkpoints.
    let mut dialogue: Vec<DialogueEntry> = Vec::with_capacity(script.steps.len());
    for step in &script.steps {
        let Some(context) = orch.scene_context(epoch) else {
            return TurnResult::cancelled();
        };

        let (role, content, kind) = if step.is_narration() {
            ("Narration".to_owned(), step.text().to_owned(), DialogueKind::Narration)
        } else if let Some(performer) = orch.performer(&step.role) {
            if !orch.emit_if_current(epoch, || StageEvent::TypingIndicator {
                base: EventBase::now(orch.session_id(), epoch),
                role: step.role.clone(),
                status: TypingStatus::Typing,
            }) {
                return TurnResult::cancelled();
            }
            match performer.reply(&context, step.text()).await {
                Ok(line) => (step.role.clone(), line, DialogueKind::Actor),
                Err(e) => {
                    let message = format!("performer '{}' failed: {e}", step.role);
                    orch.abort_turn(epoch, &message);
                    return TurnResult::error(message);
                }
            }
        } else {
            // Unrecognized role: keep the line verbatim.
            (step.role.clone(), step.text().to_owned(), DialogueKind::Other)
        };

        // Pacing: a readability throttle proportional to line length. An
        // interruption fires the cancellation token and skips the wait.
        let delay = orch.config().pacing.delay_for(content.len());
        if !delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return TurnResult::cancelled(),
            }
        }

        // Checkpoint: append + emit atomically, or discover the preemption.
        let Some(entry) = orch.commit_performed_line(epoch, &role, &content, kind) else {
            return TurnResult::cancelled();
        };
        orch.persister().append_fire_and_forget(entry.clone());
        dialogue.push(entry);
    }

    // 6. Ask the director whether the objective is satisfied.
    let Some(transcript) = orch.full_transcript(epoch) else {
        return TurnResult::cancelled();
    };
    let check = match orch
        .director()
        .check_objective(&transcript, &plan.objective)
        .await
    {
        Ok(check) => check,
        Err(e) => {
            orch.abort_turn(epoch, &format!("objective check failed: {e}"));
            return TurnResult::error(format!("objective check failed: {e}"));
        }
    };

    // 7. Resolve the objective and release the session.
    let Some((progress, meta, schedule_followup)) = orch.guarded(epoch, |state| {
        if check.completed {
            state.failure_reason.clear();
            state.retry_outline = None;
            state.objective_index += 1;
            let story_completed = state.objective_index >= state.objectives.len();
            state.phase = if story_completed {
                Phase::Completed
            } else {
                Phase::Idle
            };
            state.processing_since = None;

            let progress = ObjectiveProgress {
                completed: true,
                message: format!("Objective '{}' completed: {}", plan.objective, check.reason),
                reason: check.reason.clone(),
                index: state.objective_index,
                current: state.current_objective().map(ToOwned::to_owned),
                total: state.objectives.len(),
                story_completed,
            };
            orch.emitter().emit(StageEvent::ObjectiveStatus {
                base: EventBase::now(orch.session_id(), epoch),
                progress: progress.clone(),
            });
            if story_completed {
                orch.emitter().emit(stagecraft_core::events::status_event(
                    orch.session_id(),
                    epoch,
                    "all objectives completed; story complete",
                ));
            }
            (progress, state.meta(), !story_completed)
        } else {
            // Park the outline: the retry skips re-planning and feeds the
            // reason into the next script so the director self-corrects.
            state.failure_reason = format!(
                "Objective not met: {}. Steer the scene so it is addressed.",
                check.reason
            );
            state.retry_outline = Some(outline.clone());
            state.phase = Phase::Idle;
            state.processing_since = None;

            let progress = ObjectiveProgress {
                completed: false,
                message: format!(
                    "Objective '{}' not yet completed: {}",
                    plan.objective, check.reason
                ),
                reason: check.reason.clone(),
                index: state.objective_index,
                current: Some(plan.objective.clone()),
                total: state.objectives.len(),
                story_completed: false,
            };
            orch.emitter().emit(StageEvent::ObjectiveStatus {
                base: EventBase::now(orch.session_id(), epoch),
                progress: progress.clone(),
            });
            (progress, state.meta(), true)
        }
    }) else {
        return TurnResult::cancelled();
    };

    orch.persister().update_meta_fire_and_forget(meta);
    if schedule_followup {
        orch.schedule_continuation();
    }

    info!(
        session_id = %orch.session_id(),
        objective = %plan.objective,
        completed = check.completed,
        lines = dialogue.len(),
        story_completed = progress.story_completed,
        "turn completed"
    );

    TurnResult {
        status: TurnStatus::Success,
        message: progress.message.clone(),
        dialogue,
        objective: Some(progress),
    }
}
