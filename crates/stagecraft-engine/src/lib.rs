//! # stagecraft-engine
//!
//! The session turn-orchestration engine: decides when a turn may run under
//! concurrent access, generates it step-by-step against the director and
//! performer collaborators, abandons mid-flight work safely when the player
//! interrupts, and manages session lifecycle across many simultaneous
//! sessions.
//!
//! Core pieces:
//!
//! - [`SessionOrchestrator`]: one session's turn state machine — `advance_turn`,
//!   `interrupt`, `get_state`, `stop`, stuck recovery.
//! - [`SessionRegistry`]: thread-safe session directory with double-checked
//!   creation, client reference counting, and idle/stuck maintenance sweeps.
//! - [`EventEmitter`] / [`EventSink`]: epoch-tagged event broadcast.
//! - [`MessagePersister`]: fire-and-forget transcript persistence; failures
//!   are warnings, the in-memory session stays authoritative.

#![deny(unsafe_code)]

pub mod cast;
pub mod emitter;
pub mod errors;
pub mod orchestrator;
pub mod persister;
pub mod state;
pub mod types;

pub use cast::{Cast, CastProvider};
pub use emitter::{EventEmitter, EventSink};
pub use errors::{EngineError, TurnStatus};
pub use orchestrator::{MaintenanceHandle, SessionOrchestrator, SessionRegistry};
pub use persister::MessagePersister;
pub use state::{Phase, SessionState};
pub use types::{EngineConfig, PacingConfig, SessionSnapshot, TurnResult};
