//! Mood detector port.
//!
//! Maps free text to a mood label with intensity and confidence. The dialogue
//! core only depends on this contract; scoring lives in the adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::emotion::Mood;

/// What the detector found in one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodDetection {
    pub mood: Mood,
    pub intensity: f64,
    pub confidence: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl MoodDetection {
    pub fn new(mood: Mood, intensity: f64, confidence: f64) -> Self {
        Self {
            mood,
            intensity,
            confidence,
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Nothing recognisable: neutral with zero confidence.
    pub fn unclear() -> Self {
        Self::new(Mood::Neutral, 0.0, 0.0)
    }

    /// Returns true when an expressive mood was found with some confidence.
    pub fn is_detected(&self) -> bool {
        self.mood.is_expressive() && self.confidence > 0.0
    }
}

/// Failure of an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The call did not finish within its deadline.
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    Timeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },

    /// The collaborator could not be reached.
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    /// The collaborator answered with something unusable.
    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse {
        collaborator: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout { .. })
    }
}

#[async_trait]
pub trait MoodDetector: Send + Sync {
    /// Detects the mood expressed in `text`.
    ///
    /// # Errors
    ///
    /// - `Timeout`, `Unavailable` or `InvalidResponse` on collaborator failure
    async fn detect_mood(&self, text: &str) -> Result<MoodDetection, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_detector_is_object_safe() {
        fn _accepts_dyn(_detector: &dyn MoodDetector) {}
    }

    #[test]
    fn unclear_detection_is_not_detected() {
        assert!(!MoodDetection::unclear().is_detected());
        assert!(!MoodDetection::new(Mood::Neutral, 0.5, 0.9).is_detected());
        assert!(MoodDetection::new(Mood::Sad, 0.5, 0.6).is_detected());
    }

    #[test]
    fn keywords_default_when_missing() {
        let d: MoodDetection =
            serde_json::from_str(r#"{"mood":"sad","intensity":0.8,"confidence":0.65}"#).unwrap();
        assert!(d.keywords.is_empty());
        assert_eq!(d.mood, Mood::Sad);
    }
}
