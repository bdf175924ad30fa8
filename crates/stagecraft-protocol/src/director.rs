//! # Director Contract
//!
//! The director plans scenes, turns plans into performable scripts, and
//! judges objective completion. Implementors must be `Send + Sync` for use
//! across async tasks; the engine treats every call as blocking,
//! uninterruptible I/O and re-checks its cancellation epoch after each one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stagecraft_core::parse::parse_lenient;

use crate::errors::{ProtocolError, ProtocolResult};

/// Context handed to every director and performer call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneContext {
    /// Background summary of everything before the current window.
    pub background: String,
    /// Recent transcript window, rendered as speaker lines.
    pub transcript: String,
}

impl SceneContext {
    /// Build a context from background and transcript window.
    #[must_use]
    pub fn new(background: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            background: background.into(),
            transcript: transcript.into(),
        }
    }
}

/// A scene plan: a summary of everything so far plus the outline of the next
/// scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScenePlan {
    /// Comprehensive summary of the narrative so far. Replaces the transcript
    /// context window to bound prompt growth.
    #[serde(default)]
    pub previous_outline: String,
    /// Outline for the next scene. May be a string or a structured object,
    /// depending on the backend.
    #[serde(default)]
    pub new_outline: Value,
}

impl ScenePlan {
    /// Parse raw model output into a plan.
    ///
    /// Mirrors the lenient shape the backends actually produce: if the object
    /// has no `new_outline` key, the entire object is taken as the outline.
    pub fn from_model_output(raw: &str) -> ProtocolResult<Self> {
        let value: Value = parse_lenient(raw)?;
        let previous_outline = value
            .get("previous_outline")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let new_outline = match value.get("new_outline") {
            Some(outline) if !outline.is_null() => outline.clone(),
            _ => value,
        };
        Ok(Self {
            previous_outline,
            new_outline,
        })
    }

    /// The outline rendered as text for the scripting call.
    #[must_use]
    pub fn outline_text(&self) -> String {
        match &self.new_outline {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// One step of a turn script: a performer instruction or a narration line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// The role this step belongs to ("Narration" for narration).
    #[serde(default)]
    pub role: String,
    /// Action guidance for a performer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Literal content (narration and fallback form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ScriptStep {
    /// The step text: instruction first, content as fallback.
    #[must_use]
    pub fn text(&self) -> &str {
        self.instruction
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.content.as_deref())
            .unwrap_or_default()
    }

    /// Whether this step is a narration line.
    #[must_use]
    pub fn is_narration(&self) -> bool {
        self.role.eq_ignore_ascii_case("narration")
    }
}

/// An ordered turn script produced by the director.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnScript {
    /// The ordered steps. Backends emit the key as `scripts`.
    #[serde(default, alias = "scripts")]
    pub steps: Vec<ScriptStep>,
}

impl TurnScript {
    /// Parse raw model output into a script.
    pub fn from_model_output(raw: &str) -> ProtocolResult<Self> {
        let script: Self = parse_lenient(raw)?;
        if script.steps.is_empty() {
            return Err(ProtocolError::MalformedPlan {
                message: "script contains no steps".into(),
            });
        }
        Ok(script)
    }
}

/// The director's judgement of whether the current objective is satisfied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveCheck {
    /// Whether the objective was met.
    #[serde(default)]
    pub completed: bool,
    /// The director's stated reason.
    #[serde(default)]
    pub reason: String,
}

impl ObjectiveCheck {
    /// Parse raw model output into a check result.
    pub fn from_model_output(raw: &str) -> ProtocolResult<Self> {
        Ok(parse_lenient(raw)?)
    }
}

/// The scene-planning and judging collaborator.
#[async_trait]
pub trait Director: Send + Sync {
    /// Plan the next scene from the current context and objective. The
    /// failure reason from a previously unsatisfied check is fed back so the
    /// director can self-correct.
    async fn generate_outline(
        &self,
        context: &SceneContext,
        objective: &str,
        failure_reason: &str,
    ) -> ProtocolResult<ScenePlan>;

    /// Turn an outline into an ordered script of performable steps.
    async fn generate_turn_script(
        &self,
        context: &SceneContext,
        outline: &str,
        failure_reason: &str,
    ) -> ProtocolResult<TurnScript>;

    /// Judge whether the transcript so far satisfies the objective.
    async fn check_objective(
        &self,
        transcript: &str,
        objective: &str,
    ) -> ProtocolResult<ObjectiveCheck>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
