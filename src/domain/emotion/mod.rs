//! Emotion domain module.
//!
//! Mood vocabulary, turn-over-turn accumulation and the clarity score that
//! decides when enough is known to recommend.

mod clarity;
mod mood;
mod tracker;

pub use clarity::{
    ClarityBreakdown, ClarityConfig, ClarityWeights, EmotionClarityModel, ImmediateClarityWeights,
};
pub use mood::{Mood, MoodQuadrant};
pub use tracker::{EmotionDepthTracker, EmotionalContext, TrackerConfig};
