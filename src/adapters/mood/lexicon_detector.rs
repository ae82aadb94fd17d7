//! Keyword lexicon mood detector.
//!
//! An offline stand-in for the real mood service. Each mood owns a family of
//! whole-word keywords; the mood with the most hits wins, with table order
//! breaking ties. Intensifiers ("very", "really", ...) raise intensity.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::dialogue::normalize;
use crate::domain::emotion::Mood;
use crate::ports::{CollaboratorError, MoodDetection, MoodDetector};

const BASE_INTENSITY: f64 = 0.6;
const INTENSIFIER_STEP: f64 = 0.2;
const BASE_CONFIDENCE: f64 = 0.5;
const CONFIDENCE_STEP: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.95;

static LEXICON: Lazy<Vec<(Mood, Regex)>> = Lazy::new(|| {
    let table: [(Mood, &str); 9] = [
        (
            Mood::Happy,
            r"\b(happy|glad|joyful|cheerful|great|wonderful|excited|delighted|upbeat|good)\b",
        ),
        (
            Mood::Sad,
            r"\b(sad|unhappy|depressed|miserable|heartbroken|lonely|down|blue|crying|gloomy)\b",
        ),
        (
            Mood::Energetic,
            r"\b(energetic|pumped|hyped|workout|party|dance|dancing|lively)\b",
        ),
        (
            Mood::Calm,
            r"\b(calm|relaxed|peaceful|chill|chilled|mellow|serene|sleepy)\b",
        ),
        (
            Mood::Angry,
            r"\b(angry|mad|furious|annoyed|frustrated|pissed|irritated|rage)\b",
        ),
        (
            Mood::Anxious,
            r"\b(anxious|nervous|worried|stressed|scared|afraid|panicking|tense|overwhelmed)\b",
        ),
        (
            Mood::Romantic,
            r"\b(romantic|love|loving|crush|date|valentine)\b",
        ),
        (
            Mood::Nostalgic,
            r"\b(nostalgic|nostalgia|memories|remember|reminiscing|childhood|old times)\b",
        ),
        (
            Mood::Focused,
            r"\b(focused|focus|concentrate|concentrating|studying|productive|coding)\b",
        ),
    ];
    table
        .into_iter()
        .map(|(mood, pattern)| (mood, Regex::new(pattern).unwrap()))
        .collect()
});

static INTENSIFIERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(very|really|so|extremely|super|incredibly|totally|deeply|truly)\b").unwrap()
});

/// Offline detector backed by keyword families.
#[derive(Debug, Clone, Default)]
pub struct LexiconMoodDetector;

impl LexiconMoodDetector {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous detection, shared by the async port impl.
    pub fn analyze(&self, text: &str) -> MoodDetection {
        let normalized = normalize(text);

        let mut best: Option<(Mood, Vec<String>)> = None;
        for (mood, pattern) in LEXICON.iter() {
            let hits: Vec<String> = pattern
                .find_iter(&normalized)
                .map(|m| m.as_str().to_string())
                .collect();
            let better = match &best {
                Some((_, current)) => hits.len() > current.len(),
                None => !hits.is_empty(),
            };
            if better {
                best = Some((*mood, hits));
            }
        }

        let Some((mood, keywords)) = best else {
            return MoodDetection::unclear();
        };

        let intensifiers = INTENSIFIERS.find_iter(&normalized).count();
        let intensity = (BASE_INTENSITY + INTENSIFIER_STEP * intensifiers as f64).min(1.0);
        let confidence =
            (BASE_CONFIDENCE + CONFIDENCE_STEP * keywords.len() as f64).min(MAX_CONFIDENCE);

        MoodDetection::new(mood, intensity, confidence).with_keywords(keywords)
    }
}

#[async_trait]
impl MoodDetector for LexiconMoodDetector {
    async fn detect_mood(&self, text: &str) -> Result<MoodDetection, CollaboratorError> {
        Ok(self.analyze(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn intensifier_raises_intensity() {
        let d = LexiconMoodDetector::new().analyze("I feel very sad");
        assert_eq!(d.mood, Mood::Sad);
        assert!(approx(d.intensity, 0.8));
        assert!(approx(d.confidence, 0.65));
        assert_eq!(d.keywords, vec!["sad".to_string()]);
    }

    #[test]
    fn music_request_carries_mood() {
        let d = LexiconMoodDetector::new().analyze("play something happy");
        assert_eq!(d.mood, Mood::Happy);
        assert!(approx(d.intensity, 0.6));
        assert!(approx(d.confidence, 0.65));
    }

    #[test]
    fn cause_and_location_do_not_add_hits() {
        let d = LexiconMoodDetector::new()
            .analyze("I'm sad because I failed my exam and I'm at home alone");
        assert_eq!(d.mood, Mood::Sad);
        assert_eq!(d.keywords.len(), 1);
    }

    #[test]
    fn more_hits_win_and_raise_confidence() {
        let d = LexiconMoodDetector::new().analyze("stressed and worried, also a bit happy");
        assert_eq!(d.mood, Mood::Anxious);
        assert!(approx(d.confidence, 0.8));
    }

    #[test]
    fn ties_go_to_table_order() {
        let d = LexiconMoodDetector::new().analyze("happy but sad");
        assert_eq!(d.mood, Mood::Happy);
    }

    #[test]
    fn confidence_and_intensity_are_capped() {
        let d = LexiconMoodDetector::new().analyze(
            "so very really extremely sad unhappy depressed miserable lonely gloomy",
        );
        assert!(approx(d.intensity, 1.0));
        assert!(approx(d.confidence, MAX_CONFIDENCE));
    }

    #[test]
    fn nothing_recognised_is_unclear() {
        let d = LexiconMoodDetector::new().analyze("what is the weather");
        assert_eq!(d, MoodDetection::unclear());
        assert!(!d.is_detected());
    }

    #[tokio::test]
    async fn port_impl_delegates() {
        let d = LexiconMoodDetector::new()
            .detect_mood("I'm so angry")
            .await
            .unwrap();
        assert_eq!(d.mood, Mood::Angry);
    }
}
