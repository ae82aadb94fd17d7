//! Mood vocabulary.
//!
//! The mood detector speaks in free-form labels; everything inside the
//! dialogue core works with the closed [`Mood`] set. Each mood carries a base
//! position in valence/arousal space, both on a 0..=1 scale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mood labels understood by the dialogue core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Sad,
    Energetic,
    Calm,
    Angry,
    Anxious,
    Romantic,
    Nostalgic,
    Focused,
    #[default]
    Neutral,
}

impl Mood {
    /// Every mood, in declaration order.
    pub const ALL: [Mood; 10] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Energetic,
        Mood::Calm,
        Mood::Angry,
        Mood::Anxious,
        Mood::Romantic,
        Mood::Nostalgic,
        Mood::Focused,
        Mood::Neutral,
    ];

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Energetic => "energetic",
            Mood::Calm => "calm",
            Mood::Angry => "angry",
            Mood::Anxious => "anxious",
            Mood::Romantic => "romantic",
            Mood::Nostalgic => "nostalgic",
            Mood::Focused => "focused",
            Mood::Neutral => "neutral",
        }
    }

    /// Base (valence, arousal) for the mood at full intensity.
    pub fn base_coordinates(&self) -> (f64, f64) {
        match self {
            Mood::Happy => (0.85, 0.65),
            Mood::Sad => (0.15, 0.25),
            Mood::Energetic => (0.70, 0.90),
            Mood::Calm => (0.65, 0.20),
            Mood::Angry => (0.15, 0.85),
            Mood::Anxious => (0.25, 0.75),
            Mood::Romantic => (0.75, 0.40),
            Mood::Nostalgic => (0.45, 0.35),
            Mood::Focused => (0.55, 0.55),
            Mood::Neutral => (0.50, 0.50),
        }
    }

    /// Valence and arousal for an observation of this mood.
    ///
    /// Weak observations sit closer to the neutral midpoint: the base
    /// coordinates are blended toward 0.5 by `1 - intensity`.
    pub fn coordinates_at(&self, intensity: f64) -> (f64, f64) {
        let intensity = intensity.clamp(0.0, 1.0);
        let (valence, arousal) = self.base_coordinates();
        (
            0.5 + (valence - 0.5) * intensity,
            0.5 + (arousal - 0.5) * intensity,
        )
    }

    /// Returns true for anything other than `Neutral`.
    pub fn is_expressive(&self) -> bool {
        !matches!(self, Mood::Neutral)
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = std::convert::Infallible;

    /// Unknown labels map to `Neutral`; collaborators may use a richer vocabulary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mood = match s.trim().to_lowercase().as_str() {
            "happy" | "joyful" | "cheerful" | "excited" => Mood::Happy,
            "sad" | "melancholic" | "melancholy" | "down" | "depressed" => Mood::Sad,
            "energetic" | "pumped" | "hyped" => Mood::Energetic,
            "calm" | "relaxed" | "peaceful" | "chill" => Mood::Calm,
            "angry" | "frustrated" | "mad" => Mood::Angry,
            "anxious" | "stressed" | "nervous" | "worried" => Mood::Anxious,
            "romantic" | "loving" => Mood::Romantic,
            "nostalgic" => Mood::Nostalgic,
            "focused" | "concentrated" => Mood::Focused,
            _ => Mood::Neutral,
        };
        Ok(mood)
    }
}

/// Five-way partition of valence/arousal space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodQuadrant {
    PositiveEnergetic,
    PositiveCalm,
    NegativeEnergetic,
    NegativeCalm,
    Neutral,
}

/// Half-width of the neutral band around the (0.5, 0.5) midpoint.
const NEUTRAL_BAND: f64 = 0.1;

impl MoodQuadrant {
    /// Classifies a valence/arousal point.
    pub fn classify(valence: f64, arousal: f64) -> Self {
        let near_centre =
            (valence - 0.5).abs() <= NEUTRAL_BAND && (arousal - 0.5).abs() <= NEUTRAL_BAND;
        match (near_centre, valence >= 0.5, arousal >= 0.5) {
            (true, _, _) => MoodQuadrant::Neutral,
            (false, true, true) => MoodQuadrant::PositiveEnergetic,
            (false, true, false) => MoodQuadrant::PositiveCalm,
            (false, false, true) => MoodQuadrant::NegativeEnergetic,
            (false, false, false) => MoodQuadrant::NegativeCalm,
        }
    }
}
