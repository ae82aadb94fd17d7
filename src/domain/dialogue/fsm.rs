//! Dialogue transition engine.
//!
//! Guards are evaluated in a fixed priority order:
//!
//! 1. exit intent ends the dialogue from any live state;
//! 2. reaching the turn limit forces the dialogue toward recommendation;
//! 3. a help request keeps the current state;
//! 4. state-specific rules for the reply that was just received.
//!
//! After the first hop the engine keeps walking through states that do not
//! wait for input (see [`DialogueState::is_transient`]) so that one turn can
//! record `GREETING -> ACKNOWLEDGING -> PROBING_DEPTH`. Every hop is checked
//! against the [`StateMachine`] edge table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::intent::Intent;
use super::state::DialogueState;
use crate::domain::foundation::StateMachine;

/// Thresholds consumed by the guards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsmConfig {
    /// Clarity below which more depth probing is needed.
    pub probe_threshold: f64,
    /// Clarity at or above which recommending is allowed.
    pub high_clarity_threshold: f64,
    /// Minimum intent confidence for the direct-request fast path.
    pub fast_path_intent_confidence: f64,
    /// Upper bound on hops walked within a single turn.
    pub max_hops: usize,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            probe_threshold: 0.5,
            high_clarity_threshold: 0.75,
            fast_path_intent_confidence: 0.8,
            max_hops: 6,
        }
    }
}

/// Everything the guards look at for one turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardContext {
    pub intent: Intent,
    pub intent_confidence: f64,
    /// Accumulated clarity after this turn's observation.
    pub clarity: f64,
    /// Clarity of this utterance alone.
    pub immediate_clarity: f64,
    pub has_context: bool,
    /// True when the mood detector found an expressive mood in this message.
    pub mood_detected: bool,
    /// Number of the turn being processed (1-based).
    pub turn_number: u32,
    pub max_turns: u32,
    /// No depth question is left to ask.
    pub depth_probes_exhausted: bool,
    /// Context questions asked up to the limit, or none left to ask.
    pub context_probes_exhausted: bool,
}

impl GuardContext {
    pub fn max_turns_reached(&self) -> bool {
        self.turn_number >= self.max_turns
    }

    fn is_mood_bearing(&self) -> bool {
        self.intent.is_mood_bearing() || self.mood_detected
    }
}

/// Why a hop was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    ExitIntent,
    MaxTurnsReached,
    FastPath,
    MoodInput,
    GreetingReceived,
    NeedsMoreDepth,
    NeedsContext,
    ReadyToConfirm,
    DepthAnswered,
    ContextCaptured,
    ProbesExhausted,
    MoodConfirmed,
    MoodRejected,
    Recommended,
    RefinementRequested,
    Refined,
    Satisfied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub from: DialogueState,
    pub to: DialogueState,
    pub reason: TransitionReason,
}

/// Outcome of one turn: the path walked from `from` to `to`.
///
/// An empty `steps` list means the dialogue stays where it is and is waiting
/// for another answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: DialogueState,
    pub to: DialogueState,
    pub steps: Vec<Step>,
}

impl Transition {
    fn stay(state: DialogueState) -> Self {
        Self {
            from: state,
            to: state,
            steps: Vec::new(),
        }
    }

    pub fn is_stay(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns true if the path entered `state` at any hop.
    pub fn visited(&self, state: DialogueState) -> bool {
        self.steps.iter().any(|step| step.to == state)
    }

    /// States in walk order, starting with `from`.
    pub fn path(&self) -> Vec<DialogueState> {
        std::iter::once(self.from)
            .chain(self.steps.iter().map(|step| step.to))
            .collect()
    }
}

/// No guard matched the reply in the current state.
///
/// Non-fatal: the dialogue stays put and the caller re-prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {state} matches intent {intent}")]
pub struct GuardMismatch {
    pub state: DialogueState,
    pub intent: Intent,
}

enum Rule {
    Move(DialogueState, TransitionReason),
    Stay,
    NoMatch,
}

#[derive(Debug, Clone, Default)]
pub struct DialogueFsm {
    config: FsmConfig,
}

impl DialogueFsm {
    pub fn new(config: FsmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FsmConfig {
        &self.config
    }

    /// Decides where the dialogue goes after a reply received in `current`.
    pub fn advance(
        &self,
        current: DialogueState,
        ctx: &GuardContext,
    ) -> Result<Transition, GuardMismatch> {
        let mismatch = GuardMismatch {
            state: current,
            intent: ctx.intent,
        };
        if current.is_terminal() {
            return Err(mismatch);
        }

        let first = if ctx.intent.is_exit() {
            Rule::Move(DialogueState::Ended, TransitionReason::ExitIntent)
        } else if ctx.max_turns_reached() && !current.has_recommended() {
            Rule::Move(DialogueState::Recommendation, TransitionReason::MaxTurnsReached)
        } else if ctx.intent == Intent::Help {
            Rule::Stay
        } else {
            self.on_reply(current, ctx)
        };

        let mut transition = Transition::stay(current);
        match first {
            Rule::Move(to, reason) => {
                if !self.push_step(&mut transition, to, reason) {
                    return Err(mismatch);
                }
            }
            Rule::Stay => return Ok(transition),
            Rule::NoMatch => return Err(mismatch),
        }

        while transition.steps.len() < self.config.max_hops {
            match self.on_entry(transition.to, ctx) {
                Some((to, reason)) => {
                    if !self.push_step(&mut transition, to, reason) {
                        break;
                    }
                }
                None => break,
            }
        }

        Ok(transition)
    }

    /// Timeout from any live state.
    pub fn expire(&self, current: DialogueState) -> Option<DialogueState> {
        current.transition_to(DialogueState::Timeout).ok()
    }

    fn push_step(
        &self,
        transition: &mut Transition,
        to: DialogueState,
        reason: TransitionReason,
    ) -> bool {
        let from = transition.to;
        match from.transition_to(to) {
            Ok(to) => {
                transition.steps.push(Step { from, to, reason });
                transition.to = to;
                true
            }
            Err(error) => {
                tracing::error!(%from, %to, ?reason, %error, "rejected dialogue hop");
                false
            }
        }
    }

    /// Rules for a reply received while resting in `state`.
    fn on_reply(&self, state: DialogueState, ctx: &GuardContext) -> Rule {
        use DialogueState::*;
        match state {
            Greeting | InitialQuery => {
                if self.is_fast_path(ctx) {
                    Rule::Move(Recommendation, TransitionReason::FastPath)
                } else if ctx.is_mood_bearing() {
                    Rule::Move(Acknowledging, TransitionReason::MoodInput)
                } else if state == Greeting && ctx.intent == Intent::Greeting {
                    Rule::Move(InitialQuery, TransitionReason::GreetingReceived)
                } else {
                    Rule::NoMatch
                }
            }
            ProbingDepth => Rule::Move(ExploringContext, TransitionReason::DepthAnswered),
            ExploringContext => match self.context_exit(ctx) {
                Some(reason) => Rule::Move(ConfirmingMood, reason),
                None => Rule::Stay,
            },
            ConfirmingMood => match ctx.intent {
                Intent::Affirmative | Intent::MusicRequest | Intent::Gratitude => {
                    if ctx.clarity >= self.config.high_clarity_threshold {
                        Rule::Move(Recommendation, TransitionReason::MoodConfirmed)
                    } else {
                        Rule::Move(ProbingDepth, TransitionReason::NeedsMoreDepth)
                    }
                }
                Intent::Negative => Rule::Move(ProbingDepth, TransitionReason::MoodRejected),
                // A restated mood is read back again.
                Intent::MoodExpression | Intent::MoodElaboration | Intent::ContextSharing => {
                    Rule::Stay
                }
                _ => Rule::NoMatch,
            },
            Delivery => match ctx.intent {
                Intent::RefineRequest | Intent::Negative | Intent::MusicRequest => {
                    Rule::Move(Refining, TransitionReason::RefinementRequested)
                }
                Intent::Gratitude | Intent::Affirmative => {
                    Rule::Move(Ended, TransitionReason::Satisfied)
                }
                _ => Rule::NoMatch,
            },
            // Pass-through states never rest; treat a reply there like entry.
            Acknowledging | Recommendation | Refining => match self.on_entry(state, ctx) {
                Some((to, reason)) => Rule::Move(to, reason),
                None => Rule::NoMatch,
            },
            Ended | Timeout => Rule::NoMatch,
        }
    }

    /// Rules applied on arriving in `state` during the current turn.
    fn on_entry(
        &self,
        state: DialogueState,
        ctx: &GuardContext,
    ) -> Option<(DialogueState, TransitionReason)> {
        use DialogueState::*;
        match state {
            Acknowledging => {
                if ctx.clarity < self.config.probe_threshold && !ctx.depth_probes_exhausted {
                    Some((ProbingDepth, TransitionReason::NeedsMoreDepth))
                } else if !ctx.has_context && !ctx.context_probes_exhausted {
                    Some((ExploringContext, TransitionReason::NeedsContext))
                } else {
                    Some((ConfirmingMood, TransitionReason::ReadyToConfirm))
                }
            }
            ProbingDepth if ctx.depth_probes_exhausted => {
                Some((ConfirmingMood, TransitionReason::ProbesExhausted))
            }
            ExploringContext => self
                .context_exit(ctx)
                .map(|reason| (ConfirmingMood, reason)),
            Recommendation => Some((Delivery, TransitionReason::Recommended)),
            Refining => Some((Delivery, TransitionReason::Refined)),
            _ => None,
        }
    }

    fn context_exit(&self, ctx: &GuardContext) -> Option<TransitionReason> {
        if ctx.has_context {
            Some(TransitionReason::ContextCaptured)
        } else if ctx.context_probes_exhausted {
            Some(TransitionReason::ProbesExhausted)
        } else {
            None
        }
    }

    fn is_fast_path(&self, ctx: &GuardContext) -> bool {
        ctx.intent == Intent::MusicRequest
            && ctx.intent_confidence >= self.config.fast_path_intent_confidence
            && ctx.clarity.max(ctx.immediate_clarity) >= self.config.high_clarity_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DialogueState::*;

    fn ctx(intent: Intent) -> GuardContext {
        GuardContext {
            intent,
            intent_confidence: 0.9,
            clarity: 0.0,
            immediate_clarity: 0.0,
            has_context: false,
            mood_detected: false,
            turn_number: 1,
            max_turns: 10,
            depth_probes_exhausted: false,
            context_probes_exhausted: false,
        }
    }

    fn fsm() -> DialogueFsm {
        DialogueFsm::default()
    }

    mod opening {
        use super::*;

        #[test]
        fn low_clarity_mood_goes_to_probing_depth() {
            let c = GuardContext {
                clarity: 0.35,
                mood_detected: true,
                ..ctx(Intent::MoodExpression)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert_eq!(t.path(), vec![Greeting, Acknowledging, ProbingDepth]);
            assert_eq!(t.steps[1].reason, TransitionReason::NeedsMoreDepth);
        }

        #[test]
        fn greeting_moves_to_initial_query() {
            let t = fsm().advance(Greeting, &ctx(Intent::Greeting)).unwrap();
            assert_eq!(t.to, InitialQuery);
        }

        #[test]
        fn greeting_with_mood_words_acknowledges() {
            let c = GuardContext {
                mood_detected: true,
                clarity: 0.3,
                ..ctx(Intent::Greeting)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert!(t.visited(Acknowledging));
        }

        #[test]
        fn unrelated_text_is_a_mismatch() {
            let err = fsm().advance(InitialQuery, &ctx(Intent::Unknown)).unwrap_err();
            assert_eq!(err.state, InitialQuery);
        }

        #[test]
        fn help_stays_in_place() {
            let t = fsm().advance(InitialQuery, &ctx(Intent::Help)).unwrap();
            assert!(t.is_stay());
            assert_eq!(t.to, InitialQuery);
        }
    }

    mod fast_path {
        use super::*;

        #[test]
        fn confident_music_request_reaches_delivery() {
            let c = GuardContext {
                immediate_clarity: 0.775,
                ..ctx(Intent::MusicRequest)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert_eq!(t.path(), vec![Greeting, Recommendation, Delivery]);
            assert_eq!(t.steps[0].reason, TransitionReason::FastPath);
        }

        #[test]
        fn vague_music_request_does_not_short_circuit() {
            let c = GuardContext {
                intent_confidence: 0.6,
                immediate_clarity: 0.9,
                clarity: 0.2,
                ..ctx(Intent::MusicRequest)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert!(!t.visited(Delivery));
            assert!(t.visited(Acknowledging));
        }
    }

    mod probing {
        use super::*;

        #[test]
        fn answered_depth_probe_with_context_reaches_confirmation() {
            let c = GuardContext {
                clarity: 0.89,
                has_context: true,
                ..ctx(Intent::MoodExpression)
            };
            let t = fsm().advance(ProbingDepth, &c).unwrap();
            assert_eq!(t.path(), vec![ProbingDepth, ExploringContext, ConfirmingMood]);
        }

        #[test]
        fn answered_depth_probe_without_context_waits_in_exploring() {
            let c = GuardContext {
                clarity: 0.6,
                ..ctx(Intent::MoodElaboration)
            };
            let t = fsm().advance(ProbingDepth, &c).unwrap();
            assert_eq!(t.to, ExploringContext);
        }

        #[test]
        fn exploring_stays_until_context_or_exhaustion() {
            let t = fsm().advance(ExploringContext, &ctx(Intent::Unknown)).unwrap();
            assert!(t.is_stay());

            let c = GuardContext {
                context_probes_exhausted: true,
                ..ctx(Intent::Unknown)
            };
            let t = fsm().advance(ExploringContext, &c).unwrap();
            assert_eq!(t.to, ConfirmingMood);
            assert_eq!(t.steps[0].reason, TransitionReason::ProbesExhausted);
        }

        #[test]
        fn exhausted_bank_falls_through_to_confirmation() {
            let c = GuardContext {
                clarity: 0.2,
                mood_detected: true,
                depth_probes_exhausted: true,
                context_probes_exhausted: true,
                ..ctx(Intent::MoodExpression)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert_eq!(t.to, ConfirmingMood);
        }

        #[test]
        fn clear_mood_with_context_goes_straight_to_confirming() {
            let c = GuardContext {
                clarity: 0.8,
                has_context: true,
                ..ctx(Intent::MoodExpression)
            };
            let t = fsm().advance(Greeting, &c).unwrap();
            assert_eq!(t.path(), vec![Greeting, Acknowledging, ConfirmingMood]);
        }
    }

    mod confirming {
        use super::*;

        #[test]
        fn affirmative_with_high_clarity_delivers() {
            let c = GuardContext {
                clarity: 0.8,
                ..ctx(Intent::Affirmative)
            };
            let t = fsm().advance(ConfirmingMood, &c).unwrap();
            assert_eq!(t.path(), vec![ConfirmingMood, Recommendation, Delivery]);
        }

        #[test]
        fn affirmative_with_low_clarity_probes_again() {
            let c = GuardContext {
                clarity: 0.6,
                ..ctx(Intent::Affirmative)
            };
            let t = fsm().advance(ConfirmingMood, &c).unwrap();
            assert_eq!(t.to, ProbingDepth);
        }

        #[test]
        fn negative_loops_back_to_probing() {
            let c = GuardContext {
                clarity: 0.9,
                ..ctx(Intent::Negative)
            };
            let t = fsm().advance(ConfirmingMood, &c).unwrap();
            assert_eq!(t.to, ProbingDepth);
            assert_eq!(t.steps[0].reason, TransitionReason::MoodRejected);
        }
    }

    mod delivery {
        use super::*;

        #[test]
        fn refinement_returns_to_delivery() {
            let t = fsm().advance(Delivery, &ctx(Intent::RefineRequest)).unwrap();
            assert_eq!(t.path(), vec![Delivery, Refining, Delivery]);
        }

        #[test]
        fn gratitude_ends_the_dialogue() {
            let t = fsm().advance(Delivery, &ctx(Intent::Gratitude)).unwrap();
            assert_eq!(t.to, Ended);
        }

        #[test]
        fn greeting_in_delivery_is_a_mismatch() {
            assert!(fsm().advance(Delivery, &ctx(Intent::Greeting)).is_err());
        }
    }

    mod global_guards {
        use super::*;

        #[test]
        fn exit_ends_from_every_live_state() {
            for state in DialogueState::ALL.into_iter().filter(|s| s.is_active()) {
                let t = fsm().advance(state, &ctx(Intent::Exit)).unwrap();
                assert_eq!(t.to, Ended, "from {state}");
                assert_eq!(t.steps.len(), 1);
                assert_eq!(t.steps[0].reason, TransitionReason::ExitIntent);
            }
        }

        #[test]
        fn max_turns_forces_recommendation_instead_of_probing() {
            let c = GuardContext {
                clarity: 0.3,
                turn_number: 10,
                max_turns: 10,
                ..ctx(Intent::Negative)
            };
            let t = fsm().advance(ConfirmingMood, &c).unwrap();
            assert!(!t.visited(ProbingDepth));
            assert_eq!(t.path(), vec![ConfirmingMood, Recommendation, Delivery]);
            assert_eq!(t.steps[0].reason, TransitionReason::MaxTurnsReached);
        }

        #[test]
        fn max_turns_does_not_interrupt_delivery() {
            let c = GuardContext {
                turn_number: 10,
                max_turns: 10,
                ..ctx(Intent::RefineRequest)
            };
            let t = fsm().advance(Delivery, &c).unwrap();
            assert_eq!(t.to, Delivery);
            assert!(t.visited(Refining));
        }

        #[test]
        fn terminal_states_do_not_advance() {
            assert!(fsm().advance(Ended, &ctx(Intent::Greeting)).is_err());
            assert!(fsm().advance(Timeout, &ctx(Intent::Exit)).is_err());
        }

        #[test]
        fn expire_moves_live_states_to_timeout() {
            assert_eq!(fsm().expire(ProbingDepth), Some(Timeout));
            assert_eq!(fsm().expire(Ended), None);
        }
    }
}
