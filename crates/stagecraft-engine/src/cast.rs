//! Cast assembly — the construction-time collaborator.
//!
//! A [`CastProvider`] stands in for the external episode/show/chat lookups:
//! given a session id it produces the director, the performers, the player's
//! name, and the ordered objectives. Assembly may perform slow I/O; the
//! registry always calls it outside any map lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use stagecraft_core::ids::SessionId;
use stagecraft_protocol::{Director, Performer};

use crate::errors::EngineError;

/// Everything needed to construct one session's orchestrator.
pub struct Cast {
    /// The scene-planning collaborator.
    pub director: Arc<dyn Director>,
    /// Character voices, matched to script steps by name.
    pub performers: Vec<Arc<dyn Performer>>,
    /// The human participant's character name.
    pub player_name: String,
    /// Ordered narrative objectives.
    pub objectives: Vec<String>,
    /// Initial scenario background.
    pub background: String,
}

impl Cast {
    /// Index performers by name for script-step resolution.
    #[must_use]
    pub fn performer_map(&self) -> HashMap<String, Arc<dyn Performer>> {
        self.performers
            .iter()
            .map(|p| (p.name().to_owned(), p.clone()))
            .collect()
    }
}

/// Assembles a session's cast from external storage.
#[async_trait]
pub trait CastProvider: Send + Sync {
    /// Look up the session's show and build its cast.
    ///
    /// Returns [`EngineError::SessionNotFound`] when no such session exists
    /// upstream, [`EngineError::Cast`] for other assembly failures.
    async fn assemble(&self, session_id: &SessionId) -> Result<Cast, EngineError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
