//! Probing question catalog.
//!
//! The catalog itself is read-only after loading. Usage and success counters
//! are shared across every session. They are seeded from the store at startup
//! and only move when a committed turn's deltas are applied.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use super::stats::{QuestionStatDelta, QuestionStats};
use super::strategy::ClarificationStrategy;
use crate::domain::foundation::QuestionId;

/// Catalog compiled into the binary.
const DEFAULT_CATALOG: &str = include_str!("questions.yaml");

/// Locale every question must carry text for.
pub const FALLBACK_LOCALE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Emotion,
    Intensity,
    Context,
    Confirmation,
}

/// Kind of information a question is meant to draw out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InformationKind {
    MoodLabel,
    Cause,
    Intensity,
    Preference,
    Activity,
    Location,
    Social,
    TimeOfDay,
    Confirmation,
}

/// A catalog entry as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbingQuestion {
    pub id: QuestionId,
    pub category: QuestionCategory,
    pub depth: u8,
    pub elicits: InformationKind,
    /// Question text keyed by locale.
    pub texts: BTreeMap<String, String>,
    #[serde(default)]
    pub expected_patterns: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ProbingQuestion {
    /// Text in `locale`, falling back to `default_locale` and then English.
    pub fn text(&self, locale: &str, default_locale: &str) -> &str {
        self.texts
            .get(locale)
            .or_else(|| self.texts.get(default_locale))
            .or_else(|| self.texts.get(FALLBACK_LOCALE))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum QuestionBankError {
    #[error("failed to read question catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("question catalog is empty")]
    Empty,

    #[error("question id must not be blank")]
    BlankId,

    #[error("duplicate question id '{0}'")]
    DuplicateId(QuestionId),

    #[error("question '{0}' has no 'en' text")]
    MissingFallbackText(QuestionId),

    #[error("question '{id}' has an invalid pattern: {source}")]
    InvalidPattern {
        id: QuestionId,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug)]
struct Entry {
    question: ProbingQuestion,
    patterns: Vec<Regex>,
    usage: AtomicU64,
    success: AtomicU64,
}

/// Read-mostly catalog of clarifying questions.
#[derive(Debug)]
pub struct ProbeQuestionBank {
    entries: Vec<Entry>,
}

impl ProbeQuestionBank {
    /// Loads the built-in catalog.
    pub fn with_defaults() -> Result<Self, QuestionBankError> {
        Self::from_yaml(DEFAULT_CATALOG)
    }

    /// Loads a catalog from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, QuestionBankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, QuestionBankError> {
        let questions: Vec<ProbingQuestion> = serde_yaml::from_str(raw)?;
        Self::from_questions(questions)
    }

    pub fn from_questions(questions: Vec<ProbingQuestion>) -> Result<Self, QuestionBankError> {
        if questions.is_empty() {
            return Err(QuestionBankError::Empty);
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(questions.len());
        for question in questions {
            if question.id.as_str().trim().is_empty() {
                return Err(QuestionBankError::BlankId);
            }
            if !seen.insert(question.id.clone()) {
                return Err(QuestionBankError::DuplicateId(question.id));
            }
            if !question.texts.contains_key(FALLBACK_LOCALE) {
                return Err(QuestionBankError::MissingFallbackText(question.id));
            }
            let patterns = question
                .expected_patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| QuestionBankError::InvalidPattern {
                            id: question.id.clone(),
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(Entry {
                question,
                patterns,
                usage: AtomicU64::new(0),
                success: AtomicU64::new(0),
            });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &QuestionId) -> Option<&ProbingQuestion> {
        self.entry(id).map(|e| &e.question)
    }

    /// Picks an unused active question for `strategy`.
    ///
    /// Among candidates the least-used wins; ties go to catalog order.
    /// Returns `None` when every matching question has already been asked.
    pub fn select_question(
        &self,
        strategy: ClarificationStrategy,
        asked: &[QuestionId],
    ) -> Option<&ProbingQuestion> {
        let category = strategy.category();
        let depth = strategy.depth();
        self.entries
            .iter()
            .filter(|e| e.question.active)
            .filter(|e| e.question.category == category)
            .filter(|e| depth.map_or(true, |d| e.question.depth == d))
            .filter(|e| !asked.contains(&e.question.id))
            // min_by_key keeps the first of equal elements.
            .min_by_key(|e| e.usage.load(Ordering::Relaxed))
            .map(|e| &e.question)
    }

    pub fn has_available(&self, strategy: ClarificationStrategy, asked: &[QuestionId]) -> bool {
        self.select_question(strategy, asked).is_some()
    }

    /// Whether `reply` matches one of the question's expected patterns.
    pub fn reply_matches(&self, id: &QuestionId, reply: &str) -> bool {
        self.entry(id)
            .map_or(false, |entry| entry.patterns.iter().any(|p| p.is_match(reply)))
    }

    /// Adds committed increments. Unknown ids are ignored.
    pub fn apply(&self, deltas: &[QuestionStatDelta]) {
        for delta in deltas {
            if let Some(entry) = self.entry(&delta.question_id) {
                entry.usage.fetch_add(delta.used, Ordering::Relaxed);
                entry.success.fetch_add(delta.succeeded, Ordering::Relaxed);
            }
        }
    }

    /// Replaces the counters with stored values. Returns how many questions
    /// were found in the catalog.
    pub fn restore(&self, stats: &[QuestionStats]) -> usize {
        let mut restored = 0;
        for stat in stats {
            if let Some(entry) = self.entry(&stat.question_id) {
                entry.usage.store(stat.usage_count, Ordering::Relaxed);
                entry.success.store(stat.success_count, Ordering::Relaxed);
                restored += 1;
            }
        }
        restored
    }

    pub fn usage_count(&self, id: &QuestionId) -> u64 {
        self.entry(id)
            .map(|e| e.usage.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn success_count(&self, id: &QuestionId) -> u64 {
        self.entry(id)
            .map(|e| e.success.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn entry(&self, id: &QuestionId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.question.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn qid(s: &str) -> QuestionId {
        QuestionId::new(s).unwrap()
    }

    fn bank() -> ProbeQuestionBank {
        ProbeQuestionBank::with_defaults().unwrap()
    }

    mod loading {
        use super::*;

        #[test]
        fn default_catalog_loads() {
            let bank = bank();
            assert!(bank.len() >= 10);
            assert!(bank.get(&qid("emotion_describe")).is_some());
        }

        #[test]
        fn every_default_question_has_spanish_text() {
            let bank = bank();
            for entry in &bank.entries {
                assert!(entry.question.texts.contains_key("es"), "{}", entry.question.id);
            }
        }

        #[test]
        fn loads_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                "- id: only\n  category: context\n  depth: 1\n  elicits: location\n  texts:\n    en: \"Where?\""
            )
            .unwrap();
            let bank = ProbeQuestionBank::from_path(file.path()).unwrap();
            assert_eq!(bank.len(), 1);
            assert!(bank.get(&qid("only")).unwrap().active);
        }

        #[test]
        fn rejects_duplicates() {
            let yaml = "- {id: a, category: emotion, depth: 1, elicits: cause, texts: {en: x}}\n\
                        - {id: a, category: emotion, depth: 1, elicits: cause, texts: {en: y}}";
            let err = ProbeQuestionBank::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, QuestionBankError::DuplicateId(_)));
        }

        #[test]
        fn rejects_missing_english_text() {
            let yaml = "- {id: a, category: emotion, depth: 1, elicits: cause, texts: {es: x}}";
            let err = ProbeQuestionBank::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, QuestionBankError::MissingFallbackText(_)));
        }

        #[test]
        fn rejects_bad_patterns() {
            let yaml = "- {id: a, category: emotion, depth: 1, elicits: cause, texts: {en: x}, expected_patterns: ['(']}";
            let err = ProbeQuestionBank::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, QuestionBankError::InvalidPattern { .. }));
        }

        #[test]
        fn rejects_empty_catalog() {
            assert!(matches!(
                ProbeQuestionBank::from_yaml("[]").unwrap_err(),
                QuestionBankError::Empty
            ));
        }
    }

    mod selection {
        use super::*;

        #[test]
        fn picks_matching_category_and_depth() {
            let bank = bank();
            let q = bank
                .select_question(ClarificationStrategy::IntensityProbe, &[])
                .unwrap();
            assert_eq!(q.category, QuestionCategory::Intensity);
            assert_eq!(q.depth, 2);
        }

        #[test]
        fn skips_already_asked_questions() {
            let bank = bank();
            let first = bank
                .select_question(ClarificationStrategy::OpenEnded, &[])
                .unwrap()
                .id
                .clone();
            let second = bank
                .select_question(ClarificationStrategy::OpenEnded, &[first.clone()])
                .unwrap();
            assert_ne!(second.id, first);
        }

        #[test]
        fn prefers_least_used() {
            let bank = bank();
            let first = bank
                .select_question(ClarificationStrategy::ContextFirst, &[])
                .unwrap()
                .id
                .clone();
            bank.apply(&[QuestionStatDelta::used(first.clone())]);
            let next = bank
                .select_question(ClarificationStrategy::ContextFirst, &[])
                .unwrap();
            assert_ne!(next.id, first);
        }

        #[test]
        fn exhausted_category_returns_none() {
            let bank = bank();
            let asked: Vec<QuestionId> = bank
                .entries
                .iter()
                .filter(|e| e.question.category == QuestionCategory::Confirmation)
                .map(|e| e.question.id.clone())
                .collect();
            assert!(bank
                .select_question(ClarificationStrategy::ConfirmAndRecommend, &asked)
                .is_none());
            assert!(!bank.has_available(ClarificationStrategy::ConfirmAndRecommend, &asked));
        }

        #[test]
        fn inactive_questions_are_never_selected() {
            let yaml = "- {id: off, category: emotion, depth: 1, elicits: cause, texts: {en: x}, active: false}";
            let bank = ProbeQuestionBank::from_yaml(yaml).unwrap();
            assert!(bank.select_question(ClarificationStrategy::OpenEnded, &[]).is_none());
        }
    }

    mod counters {
        use super::*;

        #[test]
        fn reply_matching_leaves_counters_alone() {
            let bank = bank();
            let id = qid("emotion_cause");
            assert!(bank.reply_matches(&id, "Because I failed my exam"));
            assert!(!bank.reply_matches(&id, "purple"));
            assert_eq!(bank.success_count(&id), 0);
        }

        #[test]
        fn applied_deltas_add_up() {
            let bank = bank();
            let id = qid("emotion_cause");
            bank.apply(&[
                QuestionStatDelta::used(id.clone()),
                QuestionStatDelta::succeeded(id.clone()),
                QuestionStatDelta::used(id.clone()),
            ]);
            assert_eq!(bank.usage_count(&id), 2);
            assert_eq!(bank.success_count(&id), 1);
        }

        #[test]
        fn restore_seeds_selection() {
            let bank = bank();
            let first = bank
                .select_question(ClarificationStrategy::ContextFirst, &[])
                .unwrap()
                .id
                .clone();
            let restored = bank.restore(&[
                QuestionStats {
                    question_id: first.clone(),
                    usage_count: 40,
                    success_count: 12,
                },
                QuestionStats::new(qid("retired")),
            ]);
            assert_eq!(restored, 1);
            assert_eq!(bank.usage_count(&first), 40);
            assert_eq!(bank.success_count(&first), 12);
            let next = bank
                .select_question(ClarificationStrategy::ContextFirst, &[])
                .unwrap();
            assert_ne!(next.id, first);
        }

        #[test]
        fn unknown_ids_are_ignored() {
            let bank = bank();
            bank.apply(&[QuestionStatDelta::used(qid("nope"))]);
            assert_eq!(bank.usage_count(&qid("nope")), 0);
        }

        #[test]
        fn concurrent_increments_are_not_lost() {
            let bank = Arc::new(bank());
            let id = qid("context_location");
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let bank = Arc::clone(&bank);
                    let id = id.clone();
                    std::thread::spawn(move || {
                        for _ in 0..100 {
                            bank.apply(&[QuestionStatDelta::used(id.clone())]);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(bank.usage_count(&id), 800);
        }
    }

    mod locale {
        use super::*;

        #[test]
        fn falls_back_to_default_then_english() {
            let bank = bank();
            let q = bank.get(&qid("context_location")).unwrap();
            assert_eq!(q.text("es", "en"), "¿Desde dónde estás escuchando?");
            assert_eq!(q.text("fr", "es"), "¿Desde dónde estás escuchando?");
            assert_eq!(q.text("fr", "de"), "Where are you listening from?");
        }
    }
}
