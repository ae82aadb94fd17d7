//! Emotion clarity scoring.
//!
//! Clarity is the single gate between probing and recommending. It is a
//! weighted sum of five normalized terms:
//!
//! | term        | value                                   | default weight |
//! |-------------|-----------------------------------------|----------------|
//! | signal      | `min(observations / 2, 1)`              | 0.25           |
//! | consistency | `1 - clamp(variance)` (needs 2 samples) | 0.30           |
//! | confidence  | mean per-turn confidence                | 0.25           |
//! | depth       | `min(turns / 3, 1)`                     | 0.10           |
//! | context     | 1 if any context signal captured        | 0.10           |

use super::tracker::EmotionalContext;

/// Weights of the five clarity terms. They must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarityWeights {
    pub signal: f64,
    pub consistency: f64,
    pub confidence: f64,
    pub depth: f64,
    pub context: f64,
}

impl Default for ClarityWeights {
    fn default() -> Self {
        Self {
            signal: 0.25,
            consistency: 0.30,
            confidence: 0.25,
            depth: 0.10,
            context: 0.10,
        }
    }
}

impl ClarityWeights {
    pub fn sum(&self) -> f64 {
        self.signal + self.consistency + self.confidence + self.depth + self.context
    }
}

/// Weights for the single-utterance score used by the direct-request fast path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImmediateClarityWeights {
    pub mood_confidence: f64,
    pub intent_confidence: f64,
    pub context: f64,
}

impl Default for ImmediateClarityWeights {
    fn default() -> Self {
        Self {
            mood_confidence: 0.5,
            intent_confidence: 0.5,
            context: 0.15,
        }
    }
}

/// Full parameter set for [`EmotionClarityModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarityConfig {
    pub weights: ClarityWeights,
    pub immediate: ImmediateClarityWeights,
    /// Observation count at which the signal term saturates.
    pub signal_saturation: f64,
    /// Turn count at which the depth term saturates.
    pub depth_saturation: f64,
}

impl Default for ClarityConfig {
    fn default() -> Self {
        Self {
            weights: ClarityWeights::default(),
            immediate: ImmediateClarityWeights::default(),
            signal_saturation: 2.0,
            depth_saturation: 3.0,
        }
    }
}

/// Per-term breakdown, mostly useful for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarityBreakdown {
    pub signal: f64,
    pub consistency: f64,
    pub confidence: f64,
    pub depth: f64,
    pub context: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EmotionClarityModel {
    config: ClarityConfig,
}

impl EmotionClarityModel {
    pub fn new(config: ClarityConfig) -> Self {
        Self { config }
    }

    /// Clarity in `[0, 1]` for the accumulated context.
    pub fn score(
        &self,
        context: &EmotionalContext,
        turn_count: u32,
        has_context: bool,
        avg_confidence: f64,
    ) -> f64 {
        self.breakdown(context, turn_count, has_context, avg_confidence)
            .total
    }

    pub fn breakdown(
        &self,
        context: &EmotionalContext,
        turn_count: u32,
        has_context: bool,
        avg_confidence: f64,
    ) -> ClarityBreakdown {
        let w = &self.config.weights;

        let signal = saturate(f64::from(context.observation_count), self.config.signal_saturation);
        // A lone observation says nothing about consistency.
        let consistency = if context.intensity_history.len() >= 2 {
            1.0 - unit(context.mood_variance)
        } else {
            0.0
        };
        let confidence = unit(avg_confidence);
        let depth = saturate(f64::from(turn_count), self.config.depth_saturation);
        let context_term = if has_context { 1.0 } else { 0.0 };

        let total = unit(
            w.signal * signal
                + w.consistency * consistency
                + w.confidence * confidence
                + w.depth * depth
                + w.context * context_term,
        );

        ClarityBreakdown {
            signal,
            consistency,
            confidence,
            depth,
            context: context_term,
            total,
        }
    }

    /// Clarity of a single utterance, ignoring history.
    pub fn immediate_score(
        &self,
        mood_confidence: f64,
        intent_confidence: f64,
        has_context: bool,
    ) -> f64 {
        let w = &self.config.immediate;
        let context_term = if has_context { 1.0 } else { 0.0 };
        unit(
            w.mood_confidence * unit(mood_confidence)
                + w.intent_confidence * unit(intent_confidence)
                + w.context * context_term,
        )
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn saturate(value: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return 1.0;
    }
    (value / saturation).min(1.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::emotion::{EmotionDepthTracker, Mood};
    use proptest::prelude::*;

    fn model() -> EmotionClarityModel {
        EmotionClarityModel::default()
    }

    fn context_with(intensities: &[f64]) -> EmotionalContext {
        let tracker = EmotionDepthTracker::default();
        intensities.iter().fold(EmotionalContext::default(), |ctx, i| {
            tracker.update(&ctx, Mood::Sad, *i, 0.7)
        })
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((ClarityWeights::default().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_observations_score_zero() {
        let score = model().score(&EmotionalContext::default(), 0, false, 0.0);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn first_mood_turn_stays_below_probe_threshold() {
        let ctx = context_with(&[0.8]);
        let score = model().score(&ctx, 1, false, 0.775);
        let expected = 0.25 * 0.5 + 0.25 * 0.775 + 0.10 / 3.0;
        assert!((score - expected).abs() < 1e-9);
        assert!(score < 0.5);
    }

    #[test]
    fn consistent_second_turn_with_context_clears_high_threshold() {
        let ctx = context_with(&[0.8, 0.6]);
        let score = model().score(&ctx, 2, true, 0.7);
        assert!(score > 0.75, "score was {score}");
    }

    #[test]
    fn breakdown_terms_saturate() {
        let ctx = context_with(&[0.5, 0.5, 0.5, 0.5]);
        let b = model().breakdown(&ctx, 9, true, 1.0);
        assert_eq!(b.signal, 1.0);
        assert_eq!(b.depth, 1.0);
        assert_eq!(b.consistency, 1.0);
        assert!((b.total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn immediate_score_rewards_explicit_requests() {
        let m = model();
        assert!(m.immediate_score(0.65, 0.9, false) >= 0.75);
        assert!(m.immediate_score(0.0, 0.9, false) < 0.75);
        assert_eq!(m.immediate_score(1.0, 1.0, true), 1.0);
    }

    #[test]
    fn non_finite_confidence_is_treated_as_zero() {
        let ctx = context_with(&[0.5]);
        let score = model().score(&ctx, 1, false, f64::NAN);
        assert!((0.0..=1.0).contains(&score));
    }

    proptest! {
        #[test]
        fn score_is_always_in_unit_interval(
            intensities in prop::collection::vec(-1.0f64..2.0, 0..20),
            turns in 0u32..50,
            has_context in any::<bool>(),
            confidence in -2.0f64..3.0,
        ) {
            let ctx = context_with(&intensities);
            let score = model().score(&ctx, turns, has_context, confidence);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
