//! Persisted usage and success counters of catalog questions.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::QuestionId;

/// Lifetime counters of one question as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question_id: QuestionId,
    pub usage_count: u64,
    pub success_count: u64,
}

/// Increments a committed turn adds to one question's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionStatDelta {
    pub question_id: QuestionId,
    pub used: u64,
    pub succeeded: u64,
}

impl QuestionStatDelta {
    /// The question was asked.
    pub fn used(question_id: QuestionId) -> Self {
        Self {
            question_id,
            used: 1,
            succeeded: 0,
        }
    }

    /// A reply to the question matched one of its expected patterns.
    pub fn succeeded(question_id: QuestionId) -> Self {
        Self {
            question_id,
            used: 0,
            succeeded: 1,
        }
    }
}

impl QuestionStats {
    pub fn new(question_id: QuestionId) -> Self {
        Self {
            question_id,
            usage_count: 0,
            success_count: 0,
        }
    }

    pub fn add(&mut self, delta: &QuestionStatDelta) {
        self.usage_count += delta.used;
        self.success_count += delta.succeeded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accumulate() {
        let id = QuestionId::new("emotion_cause").unwrap();
        let mut stats = QuestionStats::new(id.clone());
        stats.add(&QuestionStatDelta::used(id.clone()));
        stats.add(&QuestionStatDelta::used(id.clone()));
        stats.add(&QuestionStatDelta::succeeded(id));
        assert_eq!((stats.usage_count, stats.success_count), (2, 1));
    }
}
