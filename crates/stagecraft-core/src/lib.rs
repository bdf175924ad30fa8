//! # stagecraft-core
//!
//! Foundation types for the Stagecraft narrative engine.
//!
//! This crate provides the shared vocabulary the other Stagecraft crates
//! depend on:
//!
//! - **Branded IDs**: `SessionId`, `MessageId`, `ClientId` as newtypes for type safety
//! - **Dialogue**: `DialogueEntry` and `DialogueKind` — the transcript unit
//! - **Events**: `StageEvent` — epoch-tagged session events for broadcast
//! - **Parsing**: `clean_json` / `parse_lenient` for model-produced JSON

#![deny(unsafe_code)]

pub mod dialogue;
pub mod events;
pub mod ids;
pub mod parse;
