//! Recommendation payloads exchanged with the recommender.

use serde::{Deserialize, Serialize};

use crate::domain::dialogue::ContextSignals;
use crate::domain::emotion::{EmotionalContext, Mood, MoodQuadrant};

/// A recommended track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Enriched snapshot handed to the recommender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub mood: Mood,
    pub intensity: f64,
    pub valence: f64,
    pub arousal: f64,
    pub quadrant: MoodQuadrant,
    pub context: ContextSignals,
    pub clarity: f64,
    pub turn_count: u32,
    /// Songs already delivered in this session, so refinements bring new ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl RecommendationRequest {
    /// Builds a request from the accumulated context.
    pub fn from_context(
        mood: Mood,
        emotional: &EmotionalContext,
        context: ContextSignals,
        turn_count: u32,
    ) -> Self {
        let (valence, arousal, intensity) = if emotional.has_observations() {
            (
                emotional.avg_valence,
                emotional.avg_arousal,
                emotional.avg_intensity,
            )
        } else {
            let (v, a) = mood.base_coordinates();
            (v, a, 0.5)
        };
        Self {
            mood,
            intensity,
            valence,
            arousal,
            quadrant: MoodQuadrant::classify(valence, arousal),
            context,
            clarity: emotional.clarity_score,
            turn_count,
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(ids);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::emotion::EmotionDepthTracker;

    #[test]
    fn uses_accumulated_coordinates() {
        let ctx = EmotionDepthTracker::default().update(
            &EmotionalContext::default(),
            Mood::Sad,
            1.0,
            0.8,
        );
        let request = RecommendationRequest::from_context(
            Mood::Sad,
            &ctx,
            ContextSignals::default(),
            2,
        );
        assert_eq!((request.valence, request.arousal), Mood::Sad.base_coordinates());
        assert_eq!(request.quadrant, MoodQuadrant::NegativeCalm);
        assert_eq!(request.intensity, 1.0);
    }

    #[test]
    fn falls_back_to_mood_coordinates_without_observations() {
        let request = RecommendationRequest::from_context(
            Mood::Energetic,
            &EmotionalContext::default(),
            ContextSignals::default(),
            1,
        );
        assert_eq!(request.quadrant, MoodQuadrant::PositiveEnergetic);
        assert_eq!(request.intensity, 0.5);
    }

    #[test]
    fn exclusions_are_omitted_when_empty() {
        let request = RecommendationRequest::from_context(
            Mood::Calm,
            &EmotionalContext::default(),
            ContextSignals::default(),
            1,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("exclude").is_none());
        let json = serde_json::to_value(request.excluding(vec!["s1".to_string()])).unwrap();
        assert_eq!(json["exclude"][0], "s1");
    }
}
