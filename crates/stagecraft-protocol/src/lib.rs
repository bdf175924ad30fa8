//! # stagecraft-protocol
//!
//! Contracts for the external narrative collaborators: the [`Director`] that
//! plans scenes and judges objectives, and the [`Performer`] that produces a
//! character's line. Pure request/response — all concurrency, cancellation,
//! and state live in `stagecraft-engine`.
//!
//! Backends wrapping a language model deserialize their raw output through
//! the lenient helpers on the response types, which tolerate markdown fences
//! and trailing commas.

#![deny(unsafe_code)]

pub mod director;
pub mod errors;
pub mod performer;

pub use director::{Director, ObjectiveCheck, SceneContext, ScenePlan, ScriptStep, TurnScript};
pub use errors::{ProtocolError, ProtocolResult};
pub use performer::Performer;
