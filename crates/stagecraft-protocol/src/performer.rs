//! # Performer Contract
//!
//! A performer produces a single in-character line from the director's
//! instruction and the current scene context.

use async_trait::async_trait;

use crate::director::SceneContext;
use crate::errors::ProtocolResult;

/// A character voice: one line of dialogue per call.
#[async_trait]
pub trait Performer: Send + Sync {
    /// The character name this performer speaks as. Script steps are matched
    /// to performers by this name.
    fn name(&self) -> &str;

    /// Produce the character's next line following the director's
    /// instruction.
    async fn reply(&self, context: &SceneContext, instruction: &str) -> ProtocolResult<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
