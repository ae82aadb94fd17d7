//! Probing domain module.
//!
//! Decides how to clarify an unclear mood and which question to ask.

mod question_bank;
mod stats;
mod strategy;

pub use question_bank::{
    InformationKind, ProbeQuestionBank, ProbingQuestion, QuestionBankError, QuestionCategory,
    FALLBACK_LOCALE,
};
pub use stats::{QuestionStatDelta, QuestionStats};
pub use strategy::{ClarificationStrategy, ClarificationStrategyEngine, StrategyConfig};
