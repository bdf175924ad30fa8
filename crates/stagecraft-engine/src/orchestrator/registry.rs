//! `SessionRegistry` — thread-safe directory of live session orchestrators.
//!
//! The registry's map is the only resource shared across sessions. It is
//! touched only for map operations — construction (slow I/O: cast assembly,
//! transcript rehydration) always happens outside it, with a double-checked
//! insert resolving creation races. Periodic maintenance sweeps evict idle
//! and completed sessions and recover stuck turns, independent of any single
//! session's workload.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stagecraft_core::ids::{ClientId, SessionId};
use stagecraft_store::TranscriptStore;

use crate::cast::CastProvider;
use crate::emitter::EventSink;
use crate::errors::EngineError;
use crate::orchestrator::session::SessionOrchestrator;
use crate::state::SessionState;
use crate::types::EngineConfig;

/// Directory of live sessions plus client reference counts.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionOrchestrator>>,
    session_clients: DashMap<String, HashSet<ClientId>>,
    client_sessions: DashMap<ClientId, HashSet<String>>,
    cast_provider: Arc<dyn CastProvider>,
    store: Arc<dyn TranscriptStore>,
    config: EngineConfig,
}

impl SessionRegistry {
    /// Create a registry.
    pub fn new(
        cast_provider: Arc<dyn CastProvider>,
        store: Arc<dyn TranscriptStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            session_clients: DashMap::new(),
            client_sessions: DashMap::new(),
            cast_provider,
            store,
            config,
        }
    }

    /// Return the live orchestrator for `session_id`, constructing it on
    /// first reference.
    ///
    /// Construction assembles the cast and rehydrates persisted state
    /// outside any map lock; a racing loser's instance is stopped and the
    /// winner's returned. A `sink` is attached to the returned instance if
    /// it had none (sessions created before a client connects gain their
    /// sink on first join).
    #[instrument(skip(self, sink), fields(session_id = %session_id))]
    pub async fn get_or_create(
        &self,
        session_id: &SessionId,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Arc<SessionOrchestrator>, EngineError> {
        if let Some(existing) = self.sessions.get(session_id.as_str()) {
            let orch = existing.value().clone();
            drop(existing);
            if let Some(sink) = sink {
                let _ = orch.attach_sink_if_absent(sink);
            }
            return Ok(orch);
        }

        if self.sessions.len() >= self.config.max_concurrent_sessions {
            return Err(EngineError::AtCapacity(self.sessions.len()));
        }

        // Slow path: assemble and rehydrate with no lock held.
        let cast = self.cast_provider.assemble(session_id).await?;
        let meta = self
            .store
            .load_session_meta(session_id)
            .unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "meta load failed; starting fresh");
                None
            });
        let messages = self.store.load_messages(session_id).unwrap_or_else(|e| {
            warn!(session_id = %session_id, error = %e, "transcript load failed; starting empty");
            Vec::new()
        });
        let state = SessionState::from_parts(
            cast.objectives.clone(),
            cast.background.clone(),
            meta.as_ref(),
            &messages,
        );
        let orch = SessionOrchestrator::new(
            session_id.clone(),
            &cast,
            state,
            self.store.clone(),
            self.config.clone(),
        );

        // Double-checked insert: another caller may have raced us here.
        let winner = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(existing) => {
                debug!(session_id = %session_id, "lost creation race; discarding instance");
                orch.stop();
                existing.get().clone()
            }
            Entry::Vacant(vacant) => {
                info!(session_id = %session_id, rehydrated = meta.is_some(), "session created");
                let _ = vacant.insert(orch.clone());
                orch
            }
        };

        if let Some(sink) = sink {
            let _ = winner.attach_sink_if_absent(sink);
        }
        Ok(winner)
    }

    /// Remove and stop a session. Returns whether it was present —
    /// a second call for the same id is a no-op.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let Some((_, orch)) = self.sessions.remove(session_id.as_str()) else {
            return false;
        };
        orch.stop();

        if let Some((_, clients)) = self.session_clients.remove(session_id.as_str()) {
            for client in clients {
                if let Some(mut sessions) = self.client_sessions.get_mut(&client) {
                    let _ = sessions.remove(session_id.as_str());
                }
            }
        }
        info!(session_id = %session_id, "session removed");
        true
    }

    /// The live orchestrator, if present.
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<SessionOrchestrator>> {
        self.sessions
            .get(session_id.as_str())
            .map(|e| e.value().clone())
    }

    /// Number of live sessions.
    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    // ── Client reference counting ──────────────────────────────────────

    /// Register a client with a session.
    pub fn register_client(&self, client_id: &ClientId, session_id: &SessionId) {
        let _ = self
            .client_sessions
            .entry(client_id.clone())
            .or_default()
            .insert(session_id.to_string());
        let _ = self
            .session_clients
            .entry(session_id.to_string())
            .or_default()
            .insert(client_id.clone());
    }

    /// Unregister a client from all of its sessions. Returns the session
    /// ids it left, so the caller can notify the affected rooms.
    pub fn unregister_client(&self, client_id: &ClientId) -> Vec<SessionId> {
        let Some((_, sessions)) = self.client_sessions.remove(client_id) else {
            return Vec::new();
        };
        for session in &sessions {
            if let Some(mut clients) = self.session_clients.get_mut(session) {
                let _ = clients.remove(client_id);
            }
        }
        sessions.into_iter().map(SessionId::from_string).collect()
    }

    /// Number of clients currently registered with a session.
    pub fn active_client_count(&self, session_id: &SessionId) -> usize {
        self.session_clients
            .get(session_id.as_str())
            .map_or(0, |clients| clients.len())
    }

    // ── Maintenance sweeps ─────────────────────────────────────────────

    /// Evict sessions that are finished or abandoned: completed with no
    /// clients, or clientless and idle past `max_idle`. Each evicted
    /// session is stopped. Returns the number evicted.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut to_remove = Vec::new();
        for entry in self.sessions.iter() {
            let orch = entry.value();
            let session_id = SessionId::from(entry.key().as_str());
            if self.active_client_count(&session_id) > 0 {
                continue;
            }
            let snapshot = orch.get_state();
            if snapshot.story_completed || orch.last_activity().elapsed() > max_idle {
                to_remove.push(session_id);
            }
        }

        let mut removed = 0;
        for session_id in to_remove {
            if self.remove(&session_id) {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "idle sweep evicted sessions");
        }
        removed
    }

    /// Recover sessions whose turn has been processing longer than
    /// `max_processing`. Returns the number recovered.
    pub fn sweep_stuck(&self, max_processing: Duration) -> usize {
        let mut recovered = 0;
        for entry in self.sessions.iter() {
            if entry.value().recover_if_stuck(max_processing) {
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(recovered, "stuck sweep recovered sessions");
        }
        recovered
    }

    /// Start the periodic maintenance task running both sweeps on the
    /// configured interval, independent of any session's workload.
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let stop = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let token = stop.clone();
        let interval = self.config.sweep_interval;
        let max_idle = self.config.max_idle;
        let max_processing = self.config.max_processing;

        drop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = weak.upgrade() else { break };
                        let _ = registry.sweep_stuck(max_processing);
                        let _ = registry.sweep_idle(max_idle);
                    }
                }
            }
        }));

        MaintenanceHandle { stop }
    }
}

/// Handle for stopping the maintenance task.
pub struct MaintenanceHandle {
    stop: CancellationToken,
}

impl MaintenanceHandle {
    /// Stop the maintenance task. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
