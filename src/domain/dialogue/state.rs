//! Dialogue state machine.
//!
//! Defines the states a conversation moves through and which edges between
//! them exist. Deciding *which* edge to take on a given turn is the job of
//! [`DialogueFsm`](super::DialogueFsm).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// The lifecycle state of a dialogue.
///
/// `Greeting` is the sole initial state; `Ended` and `Timeout` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    /// Session created, nothing said yet.
    #[default]
    Greeting,

    /// Greeted; waiting for the listener to say how they feel.
    InitialQuery,

    /// A mood-bearing message arrived and is being acknowledged.
    Acknowledging,

    /// Asking questions to deepen the emotional picture.
    ProbingDepth,

    /// Asking about activity, place, time or company.
    ExploringContext,

    /// Reading the understood mood back for confirmation.
    ConfirmingMood,

    /// Mood settled; recommendations being fetched.
    Recommendation,

    /// Recommendations delivered; waiting for feedback.
    Delivery,

    /// Adjusting delivered recommendations after feedback.
    Refining,

    /// Conversation finished.
    Ended,

    /// Conversation abandoned past its inactivity timeout.
    Timeout,
}

impl DialogueState {
    /// Every state, in declaration order.
    pub const ALL: [DialogueState; 11] = [
        DialogueState::Greeting,
        DialogueState::InitialQuery,
        DialogueState::Acknowledging,
        DialogueState::ProbingDepth,
        DialogueState::ExploringContext,
        DialogueState::ConfirmingMood,
        DialogueState::Recommendation,
        DialogueState::Delivery,
        DialogueState::Refining,
        DialogueState::Ended,
        DialogueState::Timeout,
    ];

    /// Stable SCREAMING_SNAKE name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueState::Greeting => "GREETING",
            DialogueState::InitialQuery => "INITIAL_QUERY",
            DialogueState::Acknowledging => "ACKNOWLEDGING",
            DialogueState::ProbingDepth => "PROBING_DEPTH",
            DialogueState::ExploringContext => "EXPLORING_CONTEXT",
            DialogueState::ConfirmingMood => "CONFIRMING_MOOD",
            DialogueState::Recommendation => "RECOMMENDATION",
            DialogueState::Delivery => "DELIVERY",
            DialogueState::Refining => "REFINING",
            DialogueState::Ended => "ENDED",
            DialogueState::Timeout => "TIMEOUT",
        }
    }

    /// Returns true for states that never wait for user input; the FSM moves
    /// through them within the same turn.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Acknowledging | Self::Recommendation | Self::Refining
        )
    }

    /// Returns true while the engine is asking clarifying questions.
    pub fn is_probing(&self) -> bool {
        matches!(self, Self::ProbingDepth | Self::ExploringContext)
    }

    /// Returns true once recommendations have been (or are being) produced.
    pub fn has_recommended(&self) -> bool {
        matches!(self, Self::Recommendation | Self::Delivery | Self::Refining)
    }

    /// Returns true if the session can still accept turns in this state.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Ended | Self::Timeout)
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogueState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::invalid_format("state", format!("unknown state '{}'", s)))
    }
}

impl StateMachine for DialogueState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use DialogueState::*;
        // Any live state may end or time out.
        if self.is_active() && matches!(target, Ended | Timeout) {
            return true;
        }
        matches!(
            (self, target),
            // Opening
            (Greeting, InitialQuery) |
            (Greeting, Acknowledging) |
            (InitialQuery, Acknowledging) |
            // Direct request fast path, or forced by the turn limit
            (Greeting, Recommendation) |
            (InitialQuery, Recommendation) |
            // Deciding what is still missing
            (Acknowledging, ProbingDepth) |
            (Acknowledging, ExploringContext) |
            (Acknowledging, ConfirmingMood) |
            (Acknowledging, Recommendation) |
            (ProbingDepth, ExploringContext) |
            (ProbingDepth, ConfirmingMood) |
            (ProbingDepth, Recommendation) |
            (ExploringContext, ConfirmingMood) |
            (ExploringContext, Recommendation) |
            // Confirmation
            (ConfirmingMood, Recommendation) |
            (ConfirmingMood, ProbingDepth) |
            // Delivery loop
            (Recommendation, Delivery) |
            (Delivery, Refining) |
            (Refining, Delivery)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use DialogueState::*;
        match self {
            Greeting => vec![InitialQuery, Acknowledging, Recommendation, Ended, Timeout],
            InitialQuery => vec![Acknowledging, Recommendation, Ended, Timeout],
            Acknowledging => vec![
                ProbingDepth,
                ExploringContext,
                ConfirmingMood,
                Recommendation,
                Ended,
                Timeout,
            ],
            ProbingDepth => vec![ExploringContext, ConfirmingMood, Recommendation, Ended, Timeout],
            ExploringContext => vec![ConfirmingMood, Recommendation, Ended, Timeout],
            ConfirmingMood => vec![Recommendation, ProbingDepth, Ended, Timeout],
            Recommendation => vec![Delivery, Ended, Timeout],
            Delivery => vec![Refining, Ended, Timeout],
            Refining => vec![Delivery, Ended, Timeout],
            Ended => vec![],
            Timeout => vec![],
        }
    }
}
