//! Intent classification.
//!
//! Rules are tried in a fixed priority order, action-oriented intents first,
//! and the first rule that matches wins. Within a rule an exact phrase match
//! scores [`EXACT_MATCH_CONFIDENCE`]; a loose keyword match scores
//! [`LOOSE_MATCH_CONFIDENCE`]. Two rules can never tie because declaration
//! order decides.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::DialogueState;

pub const EXACT_MATCH_CONFIDENCE: f64 = 0.9;
pub const LOOSE_MATCH_CONFIDENCE: f64 = 0.6;
/// Confidence assigned when unmatched text is interpreted from the current state.
pub const STATE_FALLBACK_CONFIDENCE: f64 = 0.5;

/// What the listener is trying to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    MoodExpression,
    MusicRequest,
    ContextSharing,
    RefineRequest,
    MoodElaboration,
    Affirmative,
    Negative,
    Gratitude,
    Exit,
    Help,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "GREETING",
            Intent::MoodExpression => "MOOD_EXPRESSION",
            Intent::MusicRequest => "MUSIC_REQUEST",
            Intent::ContextSharing => "CONTEXT_SHARING",
            Intent::RefineRequest => "REFINE_REQUEST",
            Intent::MoodElaboration => "MOOD_ELABORATION",
            Intent::Affirmative => "AFFIRMATIVE",
            Intent::Negative => "NEGATIVE",
            Intent::Gratitude => "GRATITUDE",
            Intent::Exit => "EXIT",
            Intent::Help => "HELP",
            Intent::Unknown => "UNKNOWN",
        }
    }

    /// Returns true for intents that tell us something about mood or situation.
    pub fn is_mood_bearing(&self) -> bool {
        matches!(
            self,
            Intent::MoodExpression
                | Intent::MoodElaboration
                | Intent::ContextSharing
                | Intent::MusicRequest
        )
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Intent::Exit)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

impl IntentClassification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence,
        }
    }

    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.0)
    }
}

struct IntentRule {
    intent: Intent,
    exact: Regex,
    loose: Option<Regex>,
}

impl IntentRule {
    fn new(intent: Intent, exact: &str, loose: Option<&str>) -> Self {
        Self {
            intent,
            exact: compile(exact),
            loose: loose.map(compile),
        }
    }

    fn confidence(&self, text: &str) -> Option<f64> {
        if self.exact.is_match(text) {
            return Some(EXACT_MATCH_CONFIDENCE);
        }
        match &self.loose {
            Some(loose) if loose.is_match(text) => Some(LOOSE_MATCH_CONFIDENCE),
            _ => None,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time literals covered by the tests below.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid intent pattern {pattern:?}: {e}"))
}

/// Priority-ordered rule table.
static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    vec![
        IntentRule::new(
            Intent::Exit,
            r"^\s*(bye|bye bye|goodbye|quit|exit|stop|end|i'?m done|i am done|that'?s all)\s*[.!]*\s*$",
            Some(r"\b(bye|goodbye|see you|see ya|gotta go|got to go|end (the )?(chat|conversation)|stop talking)\b|\b(i want to|i'd like to|let'?s) (stop|quit|end)( (now|here|talking|chatting|it|this( chat| conversation)?))?\s*[.!]*$"),
        ),
        IntentRule::new(
            Intent::Help,
            r"^\s*(help|\?+)\s*[.!?]*\s*$",
            Some(r"\b(how does this work|what can you do|what do i do|help me understand)\b"),
        ),
        IntentRule::new(
            Intent::Gratitude,
            r"^\s*(thanks|thank you|thx|ty|cheers|perfect|love it)\b",
            Some(r"\b(thanks|thank you|love (this|these|it)|this is great|that'?s great|exactly what i (needed|wanted))\b"),
        ),
        IntentRule::new(
            Intent::RefineRequest,
            r"\b(something else|different songs?|another (song|one|playlist)|more like (this|that)|less (sad|upbeat|slow|fast|intense|loud)|more (upbeat|energetic|calm|chill|mellow|relaxing)|change (it|the songs?|the music)|not (quite )?what i (wanted|meant))\b",
            Some(r"\b(skip|instead|faster|slower|louder|softer)\b"),
        ),
        IntentRule::new(
            Intent::MusicRequest,
            r"\b(play|put on|recommend|suggest|queue)\b",
            Some(r"\b(songs?|music|playlist|tracks?|tunes)\b"),
        ),
        IntentRule::new(
            Intent::Affirmative,
            r"^\s*(yes|yeah|yep|yup|sure|ok|okay|correct|right|exactly|absolutely|definitely|that'?s right|that'?s it|sounds good|go ahead|please do)\b",
            Some(r"\b(i guess so|pretty much|that'?s true|you got it)\b"),
        ),
        IntentRule::new(
            Intent::Negative,
            r"^\s*(no|nope|nah|not really|not quite|wrong|incorrect)\b",
            Some(r"\b(not at all|that'?s not (it|right)|i don'?t think so)\b"),
        ),
        IntentRule::new(
            Intent::Greeting,
            r"^\s*(hi|hello|hey|hiya|howdy|greetings|good (morning|afternoon|evening))\b",
            None,
        ),
        IntentRule::new(
            Intent::MoodExpression,
            r"\b(i feel|i'?m feeling|i am feeling|i'?ve been feeling|i have been feeling|feeling)\b",
            Some(r"\b(happy|sad|angry|mad|anxious|stressed|nervous|worried|calm|relaxed|tired|exhausted|lonely|excited|depressed|down|upset|frustrated|bored|nostalgic|romantic|content|joyful|miserable|heartbroken|energetic|pumped|chill)\b"),
        ),
        IntentRule::new(
            Intent::MoodElaboration,
            r"\b(because|ever since|the reason is|due to)\b",
            Some(r"\b(really|very|extremely|so much|a little|a bit|slightly|somewhat|kind of|sort of)\b"),
        ),
        IntentRule::new(
            Intent::ContextSharing,
            r"\b(i'?m at|i am at|at (home|work|the gym|school|the office)|on my way|driving|working out|studying|cooking|commuting|by myself|alone|with (my )?(friends|family|partner|girlfriend|boyfriend|wife|husband|kids))\b",
            Some(r"\b(tonight|this morning|this evening|right now|today|party|gym|office|car|home)\b"),
        ),
    ]
});

/// Maps raw text plus the current dialogue state to an intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `text` as spoken while the dialogue is in `state`.
    pub fn classify(&self, text: &str, state: DialogueState) -> IntentClassification {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return IntentClassification::unknown();
        }

        for rule in RULES.iter() {
            if let Some(confidence) = rule.confidence(&normalized) {
                return IntentClassification::new(rule.intent, confidence);
            }
        }

        // Unmatched replies to a question are read as answers to it.
        match state {
            DialogueState::ProbingDepth => {
                IntentClassification::new(Intent::MoodElaboration, STATE_FALLBACK_CONFIDENCE)
            }
            DialogueState::ExploringContext => {
                IntentClassification::new(Intent::ContextSharing, STATE_FALLBACK_CONFIDENCE)
            }
            _ => IntentClassification::unknown(),
        }
    }
}

/// Lowercases, unifies typographic apostrophes and collapses whitespace.
pub(crate) fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> IntentClassification {
        IntentClassifier::new().classify(text, DialogueState::Greeting)
    }

    mod rule_table {
        use super::*;

        #[test]
        fn all_patterns_compile() {
            assert_eq!(RULES.len(), 11);
        }

        #[test]
        fn exact_mood_phrase_scores_high() {
            let c = classify("I feel very sad");
            assert_eq!(c.intent, Intent::MoodExpression);
            assert_eq!(c.confidence, EXACT_MATCH_CONFIDENCE);
        }

        #[test]
        fn bare_mood_word_scores_loose() {
            let c = classify("I'm sad because I failed my exam and I'm at home alone");
            assert_eq!(c.intent, Intent::MoodExpression);
            assert_eq!(c.confidence, LOOSE_MATCH_CONFIDENCE);
        }

        #[test]
        fn play_is_an_explicit_music_request() {
            let c = classify("play something happy");
            assert_eq!(c.intent, Intent::MusicRequest);
            assert_eq!(c.confidence, EXACT_MATCH_CONFIDENCE);
        }

        #[test]
        fn short_replies() {
            assert_eq!(classify("yes").intent, Intent::Affirmative);
            assert_eq!(classify("Nope.").intent, Intent::Negative);
            assert_eq!(classify("thanks!").intent, Intent::Gratitude);
            assert_eq!(classify("hello there").intent, Intent::Greeting);
            assert_eq!(classify("help").intent, Intent::Help);
        }

        #[test]
        fn refinement_phrases() {
            assert_eq!(classify("something else please").intent, Intent::RefineRequest);
            assert_eq!(classify("a bit more upbeat").intent, Intent::RefineRequest);
        }

        #[test]
        fn context_sharing_without_mood_words() {
            let c = classify("just driving to work with my friends");
            assert_eq!(c.intent, Intent::ContextSharing);
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn exit_beats_everything() {
            assert_eq!(classify("bye").intent, Intent::Exit);
            assert_eq!(classify("ok I gotta go, I feel fine").intent, Intent::Exit);
        }

        #[test]
        fn farewells_inside_short_replies_are_exit() {
            for text in ["bye for now", "bye then", "ok bye", "I want to stop now", "let's end this."] {
                let c = IntentClassifier::new().classify(text, DialogueState::ProbingDepth);
                assert_eq!(c.intent, Intent::Exit, "{}", text);
            }
        }

        #[test]
        fn stopping_a_feeling_is_not_exit() {
            let c = IntentClassifier::new()
                .classify("I want to stop feeling sad", DialogueState::ProbingDepth);
            assert_ne!(c.intent, Intent::Exit);
        }

        #[test]
        fn exit_word_inside_sentence_is_not_exit() {
            // "stop" only counts when it is the whole message.
            assert_ne!(classify("I can't stop feeling sad").intent, Intent::Exit);
        }

        #[test]
        fn music_request_beats_mood_expression() {
            let c = classify("I feel sad, play some music");
            assert_eq!(c.intent, Intent::MusicRequest);
        }

        #[test]
        fn greeting_is_only_recognised_at_the_start() {
            assert_ne!(classify("they said hi to me and I feel down").intent, Intent::Greeting);
        }
    }

    mod fallback {
        use super::*;

        #[test]
        fn unmatched_text_while_probing_depth_is_elaboration() {
            let c = IntentClassifier::new().classify("my dog ran away", DialogueState::ProbingDepth);
            assert_eq!(c.intent, Intent::MoodElaboration);
            assert_eq!(c.confidence, STATE_FALLBACK_CONFIDENCE);
        }

        #[test]
        fn unmatched_text_while_exploring_is_context() {
            let c = IntentClassifier::new().classify("the library", DialogueState::ExploringContext);
            assert_eq!(c.intent, Intent::ContextSharing);
        }

        #[test]
        fn unmatched_text_elsewhere_is_unknown_with_zero_confidence() {
            let c = classify("purple elephants");
            assert_eq!(c, IntentClassification::unknown());
        }

        #[test]
        fn empty_text_is_unknown() {
            let c = IntentClassifier::new().classify("   ", DialogueState::ProbingDepth);
            assert_eq!(c.intent, Intent::Unknown);
        }
    }

    mod normalization {
        use super::*;

        #[test]
        fn typographic_apostrophes_are_unified() {
            assert_eq!(normalize("I\u{2019}m  Done"), "i'm done");
            assert_eq!(classify("I\u{2019}m done").intent, Intent::Exit);
        }
    }

    #[test]
    fn serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&Intent::MoodElaboration).unwrap(),
            "\"MOOD_ELABORATION\""
        );
        assert_eq!(Intent::MusicRequest.to_string(), "MUSIC_REQUEST");
    }
}
