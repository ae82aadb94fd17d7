//! Domain layer containing the dialogue logic and its types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, errors, state machine trait)
//! - `emotion` - Mood vocabulary, accumulation and clarity scoring
//! - `dialogue` - States, intents, context signals and the transition engine
//! - `probing` - Clarification strategies and the probing question bank
//! - `conversation` - Session aggregate, turns, idempotency and recommendation payloads

pub mod conversation;
pub mod dialogue;
pub mod emotion;
pub mod foundation;
pub mod probing;
