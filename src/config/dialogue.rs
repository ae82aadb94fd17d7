//! Dialogue tuning: accumulation, clarity scoring, FSM thresholds and probing.

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;
use crate::domain::dialogue::FsmConfig;
use crate::domain::emotion::{ClarityConfig, ClarityWeights, ImmediateClarityWeights, TrackerConfig};
use crate::domain::probing::StrategyConfig;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Dialogue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DialogueConfig {
    /// Per-turn decay for averaged intensity/valence/arousal
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Observations kept per history list
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Intensity variance below which a context counts as stable
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,

    #[serde(default = "default_weight_signal")]
    pub weight_signal: f64,

    #[serde(default = "default_weight_consistency")]
    pub weight_consistency: f64,

    #[serde(default = "default_weight_confidence")]
    pub weight_confidence: f64,

    #[serde(default = "default_weight_depth")]
    pub weight_depth: f64,

    #[serde(default = "default_weight_context")]
    pub weight_context: f64,

    /// Observation count at which the signal term saturates
    #[serde(default = "default_signal_saturation")]
    pub signal_saturation: f64,

    /// Turn count at which the depth term saturates
    #[serde(default = "default_depth_saturation")]
    pub depth_saturation: f64,

    #[serde(default = "default_immediate_mood_weight")]
    pub immediate_mood_weight: f64,

    #[serde(default = "default_immediate_intent_weight")]
    pub immediate_intent_weight: f64,

    #[serde(default = "default_immediate_context_weight")]
    pub immediate_context_weight: f64,

    /// Clarity below which depth probing continues
    #[serde(default = "default_probe_threshold")]
    pub probe_threshold: f64,

    /// Clarity at or above which a recommendation may be made
    #[serde(default = "default_high_clarity_threshold")]
    pub high_clarity_threshold: f64,

    /// Minimum intent confidence for the direct-request fast path
    #[serde(default = "default_fast_path_intent_confidence")]
    pub fast_path_intent_confidence: f64,

    /// Upper bound on state hops within one turn
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Turn count from which low-clarity dialogues ask about context
    #[serde(default = "default_context_first_after_turns")]
    pub context_first_after_turns: u32,

    /// Context questions asked before moving on to confirmation
    #[serde(default = "default_max_context_probes")]
    pub max_context_probes: u32,

    /// Locale used when the client sends none
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Longest accepted message, in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Optional YAML catalog replacing the built-in questions
    pub question_bank_path: Option<PathBuf>,
}

impl DialogueConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            decay: self.decay,
            history_limit: self.history_limit,
            stability_threshold: self.stability_threshold,
        }
    }

    pub fn clarity_weights(&self) -> ClarityWeights {
        ClarityWeights {
            signal: self.weight_signal,
            consistency: self.weight_consistency,
            confidence: self.weight_confidence,
            depth: self.weight_depth,
            context: self.weight_context,
        }
    }

    pub fn clarity_config(&self) -> ClarityConfig {
        ClarityConfig {
            weights: self.clarity_weights(),
            immediate: ImmediateClarityWeights {
                mood_confidence: self.immediate_mood_weight,
                intent_confidence: self.immediate_intent_weight,
                context: self.immediate_context_weight,
            },
            signal_saturation: self.signal_saturation,
            depth_saturation: self.depth_saturation,
        }
    }

    pub fn fsm_config(&self) -> FsmConfig {
        FsmConfig {
            probe_threshold: self.probe_threshold,
            high_clarity_threshold: self.high_clarity_threshold,
            fast_path_intent_confidence: self.fast_path_intent_confidence,
            max_hops: self.max_hops,
        }
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            probe_threshold: self.probe_threshold,
            high_clarity_threshold: self.high_clarity_threshold,
            context_first_after_turns: self.context_first_after_turns,
        }
    }

    /// Validate dialogue configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ValidationError::InvalidDecay(self.decay));
        }
        if self.history_limit == 0 {
            return Err(ValidationError::NotPositive("history_limit"));
        }

        let weights = self.clarity_weights();
        let all_weights = [
            weights.signal,
            weights.consistency,
            weights.confidence,
            weights.depth,
            weights.context,
        ];
        if all_weights.iter().any(|w| !(0.0..=1.0).contains(w))
            || (weights.sum() - 1.0).abs() > WEIGHT_TOLERANCE
        {
            return Err(ValidationError::InvalidClarityWeights(weights.sum()));
        }

        if self.signal_saturation <= 0.0 {
            return Err(ValidationError::NotPositive("signal_saturation"));
        }
        if self.depth_saturation <= 0.0 {
            return Err(ValidationError::NotPositive("depth_saturation"));
        }

        for (name, value) in [
            ("stability_threshold", self.stability_threshold),
            ("immediate_mood_weight", self.immediate_mood_weight),
            ("immediate_intent_weight", self.immediate_intent_weight),
            ("immediate_context_weight", self.immediate_context_weight),
            ("probe_threshold", self.probe_threshold),
            ("high_clarity_threshold", self.high_clarity_threshold),
            ("fast_path_intent_confidence", self.fast_path_intent_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfUnitRange(name));
            }
        }
        if self.probe_threshold >= self.high_clarity_threshold {
            return Err(ValidationError::ThresholdsOutOfOrder);
        }

        if self.max_hops == 0 {
            return Err(ValidationError::NotPositive("max_hops"));
        }
        if self.max_message_length == 0 {
            return Err(ValidationError::NotPositive("max_message_length"));
        }
        if self.default_locale.trim().is_empty() {
            return Err(ValidationError::MissingRequired("DIALOGUE__DEFAULT_LOCALE"));
        }
        Ok(())
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            decay: default_decay(),
            history_limit: default_history_limit(),
            stability_threshold: default_stability_threshold(),
            weight_signal: default_weight_signal(),
            weight_consistency: default_weight_consistency(),
            weight_confidence: default_weight_confidence(),
            weight_depth: default_weight_depth(),
            weight_context: default_weight_context(),
            signal_saturation: default_signal_saturation(),
            depth_saturation: default_depth_saturation(),
            immediate_mood_weight: default_immediate_mood_weight(),
            immediate_intent_weight: default_immediate_intent_weight(),
            immediate_context_weight: default_immediate_context_weight(),
            probe_threshold: default_probe_threshold(),
            high_clarity_threshold: default_high_clarity_threshold(),
            fast_path_intent_confidence: default_fast_path_intent_confidence(),
            max_hops: default_max_hops(),
            context_first_after_turns: default_context_first_after_turns(),
            max_context_probes: default_max_context_probes(),
            default_locale: default_locale(),
            max_message_length: default_max_message_length(),
            question_bank_path: None,
        }
    }
}

fn default_decay() -> f64 {
    0.8
}

fn default_history_limit() -> usize {
    10
}

fn default_stability_threshold() -> f64 {
    0.05
}

fn default_weight_signal() -> f64 {
    0.25
}

fn default_weight_consistency() -> f64 {
    0.30
}

fn default_weight_confidence() -> f64 {
    0.25
}

fn default_weight_depth() -> f64 {
    0.10
}

fn default_weight_context() -> f64 {
    0.10
}

fn default_signal_saturation() -> f64 {
    2.0
}

fn default_depth_saturation() -> f64 {
    3.0
}

fn default_immediate_mood_weight() -> f64 {
    0.5
}

fn default_immediate_intent_weight() -> f64 {
    0.5
}

fn default_immediate_context_weight() -> f64 {
    0.15
}

fn default_probe_threshold() -> f64 {
    0.5
}

fn default_high_clarity_threshold() -> f64 {
    0.75
}

fn default_fast_path_intent_confidence() -> f64 {
    0.8
}

fn default_max_hops() -> usize {
    6
}

fn default_context_first_after_turns() -> u32 {
    2
}

fn default_max_context_probes() -> u32 {
    2
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_max_message_length() -> usize {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_domain_defaults() {
        let config = DialogueConfig::default();
        assert_eq!(config.tracker_config(), TrackerConfig::default());
        assert_eq!(config.clarity_config(), ClarityConfig::default());
        assert_eq!(config.fsm_config(), FsmConfig::default());
        assert_eq!(config.strategy_config(), StrategyConfig::default());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(DialogueConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_decay_out_of_range() {
        for decay in [0.0, -0.5, 1.5] {
            let config = DialogueConfig {
                decay,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidDecay(decay)));
        }
    }

    #[test]
    fn test_decay_of_one_is_allowed() {
        let config = DialogueConfig {
            decay: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_weights_must_sum_to_one() {
        let config = DialogueConfig {
            weight_signal: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidClarityWeights(_))
        ));
    }

    #[test]
    fn test_validation_thresholds_in_order() {
        let config = DialogueConfig {
            probe_threshold: 0.8,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::ThresholdsOutOfOrder));
    }

    #[test]
    fn test_validation_zero_history() {
        let config = DialogueConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::NotPositive("history_limit"))
        );
    }
}
