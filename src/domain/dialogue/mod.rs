//! Dialogue domain module.
//!
//! States, intents, situational context and the transition engine that moves
//! a conversation from greeting to delivery.

mod context_signals;
mod fsm;
mod intent;
mod state;

pub use context_signals::{
    Activity, ContextSignalExtractor, ContextSignals, Location, SocialContext, TimeOfDay,
};
pub use fsm::{
    DialogueFsm, FsmConfig, GuardContext, GuardMismatch, Step, Transition, TransitionReason,
};
pub(crate) use intent::normalize;
pub use intent::{
    Intent, IntentClassification, IntentClassifier, EXACT_MATCH_CONFIDENCE,
    LOOSE_MATCH_CONFIDENCE, STATE_FALLBACK_CONFIDENCE,
};
pub use state::DialogueState;
