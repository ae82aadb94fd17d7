//! Clarification strategy selection.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::question_bank::QuestionCategory;
use crate::domain::dialogue::DialogueState;

/// How the next clarifying question should be approached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClarificationStrategy {
    /// Broad question about how the listener feels.
    OpenEnded,
    /// Ask about the situation before digging into feelings.
    ContextFirst,
    /// Pin down how strong the feeling is.
    IntensityProbe,
    /// Enough is known; read it back and move on.
    ConfirmAndRecommend,
}

impl ClarificationStrategy {
    /// Question category served by this strategy.
    pub fn category(&self) -> QuestionCategory {
        match self {
            Self::OpenEnded => QuestionCategory::Emotion,
            Self::ContextFirst => QuestionCategory::Context,
            Self::IntensityProbe => QuestionCategory::Intensity,
            Self::ConfirmAndRecommend => QuestionCategory::Confirmation,
        }
    }

    /// Required question depth, if the strategy cares.
    pub fn depth(&self) -> Option<u8> {
        match self {
            Self::OpenEnded => Some(1),
            Self::IntensityProbe => Some(2),
            Self::ContextFirst | Self::ConfirmAndRecommend => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenEnded => "OPEN_ENDED",
            Self::ContextFirst => "CONTEXT_FIRST",
            Self::IntensityProbe => "INTENSITY_PROBE",
            Self::ConfirmAndRecommend => "CONFIRM_AND_RECOMMEND",
        }
    }
}

impl fmt::Display for ClarificationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClarityBand {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyConfig {
    pub probe_threshold: f64,
    pub high_clarity_threshold: f64,
    /// Turn count from which low-clarity dialogues switch to context questions.
    pub context_first_after_turns: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            probe_threshold: 0.5,
            high_clarity_threshold: 0.75,
            context_first_after_turns: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClarificationStrategyEngine {
    config: StrategyConfig,
}

impl ClarificationStrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Fixed decision table over clarity band, context and turn count.
    pub fn select_strategy(
        &self,
        clarity: f64,
        has_context: bool,
        turn_count: u32,
    ) -> ClarificationStrategy {
        use ClarificationStrategy::*;
        let later = turn_count >= self.config.context_first_after_turns;
        match (self.band(clarity), has_context, later) {
            (ClarityBand::High, _, _) => ConfirmAndRecommend,
            (ClarityBand::Medium, true, _) => IntensityProbe,
            (ClarityBand::Medium, false, _) => ContextFirst,
            (ClarityBand::Low, false, false) => OpenEnded,
            (ClarityBand::Low, false, true) => ContextFirst,
            (ClarityBand::Low, true, _) => OpenEnded,
        }
    }

    /// Strategy for the question to ask while resting in `state`.
    ///
    /// Returns `None` for states that do not ask questions.
    pub fn strategy_for_state(
        &self,
        state: DialogueState,
        clarity: f64,
        has_context: bool,
        turn_count: u32,
    ) -> Option<ClarificationStrategy> {
        match state {
            DialogueState::ProbingDepth => {
                match self.select_strategy(clarity, has_context, turn_count) {
                    // The listener rejected a read-back; dig deeper instead.
                    ClarificationStrategy::ConfirmAndRecommend => {
                        Some(ClarificationStrategy::IntensityProbe)
                    }
                    strategy => Some(strategy),
                }
            }
            DialogueState::ExploringContext => Some(ClarificationStrategy::ContextFirst),
            DialogueState::ConfirmingMood => Some(ClarificationStrategy::ConfirmAndRecommend),
            _ => None,
        }
    }

    fn band(&self, clarity: f64) -> ClarityBand {
        if clarity >= self.config.high_clarity_threshold {
            ClarityBand::High
        } else if clarity >= self.config.probe_threshold {
            ClarityBand::Medium
        } else {
            ClarityBand::Low
        }
    }
}
