//! Emotion depth tracking.
//!
//! Folds per-turn mood observations into a rolling [`EmotionalContext`].
//! Averages use exponential decay over turn index: with `n` observations in
//! the window, the observation at position `i` (1-based, oldest first) gets
//! weight `decay^(n - i)`, so the newest observation always weighs 1.0.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::mood::{Mood, MoodQuadrant};

/// Tunable parameters for the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Per-turn decay applied to older observations, in (0, 1].
    pub decay: f64,
    /// Maximum observations kept in each history list.
    pub history_limit: usize,
    /// Intensity variance below which the context counts as stable.
    pub stability_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            decay: 0.8,
            history_limit: 10,
            stability_threshold: 0.05,
        }
    }
}

/// Rolling aggregate of everything learned about the listener's mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    /// Most frequent mood in the window, ties broken by recency.
    pub dominant_mood: Mood,
    /// Decay-weighted average intensity.
    pub avg_intensity: f64,
    /// Decay-weighted average valence.
    pub avg_valence: f64,
    /// Decay-weighted average arousal.
    pub avg_arousal: f64,
    pub mood_history: VecDeque<Mood>,
    pub intensity_history: VecDeque<f64>,
    pub valence_history: VecDeque<f64>,
    pub arousal_history: VecDeque<f64>,
    /// Total observations ever folded in (not bounded by the window).
    pub observation_count: u32,
    /// Latest clarity score assigned by the clarity model.
    pub clarity_score: f64,
    /// Population variance of the intensity window.
    pub mood_variance: f64,
    pub is_stable: bool,
    confidence_total: f64,
    confidence_turns: u32,
}

impl Default for EmotionalContext {
    fn default() -> Self {
        Self {
            dominant_mood: Mood::Neutral,
            avg_intensity: 0.0,
            avg_valence: 0.5,
            avg_arousal: 0.5,
            mood_history: VecDeque::new(),
            intensity_history: VecDeque::new(),
            valence_history: VecDeque::new(),
            arousal_history: VecDeque::new(),
            observation_count: 0,
            clarity_score: 0.0,
            mood_variance: 0.0,
            is_stable: false,
            confidence_total: 0.0,
            confidence_turns: 0,
        }
    }
}

impl EmotionalContext {
    /// Returns true once at least one mood observation has been recorded.
    pub fn has_observations(&self) -> bool {
        self.observation_count > 0
    }

    /// Records the combined intent/mood confidence of one turn.
    pub fn record_turn_confidence(&mut self, confidence: f64) {
        self.confidence_total += confidence.clamp(0.0, 1.0);
        self.confidence_turns += 1;
    }

    /// Mean per-turn confidence, 0.0 before any turn.
    pub fn mean_confidence(&self) -> f64 {
        if self.confidence_turns == 0 {
            0.0
        } else {
            self.confidence_total / f64::from(self.confidence_turns)
        }
    }

    /// Quadrant of the current averaged position.
    pub fn quadrant(&self) -> MoodQuadrant {
        MoodQuadrant::classify(self.avg_valence, self.avg_arousal)
    }

    /// Returns a copy carrying the given clarity score.
    pub fn with_clarity(mut self, clarity: f64) -> Self {
        self.clarity_score = clarity.clamp(0.0, 1.0);
        self
    }
}

/// Accumulates mood observations turn over turn.
#[derive(Debug, Clone, Default)]
pub struct EmotionDepthTracker {
    config: TrackerConfig,
}

impl EmotionDepthTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Folds one observation into the context and returns the updated aggregate.
    ///
    /// `confidence` is the turn's combined confidence and joins the running
    /// mean read by [`EmotionalContext::mean_confidence`].
    pub fn update(
        &self,
        context: &EmotionalContext,
        mood: Mood,
        intensity: f64,
        confidence: f64,
    ) -> EmotionalContext {
        let intensity = sanitize(intensity);
        let limit = self.config.history_limit.max(1);
        let (valence, arousal) = mood.coordinates_at(intensity);

        let mut next = context.clone();
        push_bounded(&mut next.mood_history, mood, limit);
        push_bounded(&mut next.intensity_history, intensity, limit);
        push_bounded(&mut next.valence_history, valence, limit);
        push_bounded(&mut next.arousal_history, arousal, limit);
        next.observation_count = next.observation_count.saturating_add(1);
        next.record_turn_confidence(sanitize(confidence));

        next.avg_intensity = self.decayed_average(&next.intensity_history);
        next.avg_valence = self.decayed_average(&next.valence_history);
        next.avg_arousal = self.decayed_average(&next.arousal_history);
        next.dominant_mood = dominant_mood(&next.mood_history);
        next.mood_variance = population_variance(&next.intensity_history);
        next.is_stable = next.intensity_history.len() >= 2
            && next.mood_variance < self.config.stability_threshold;

        tracing::trace!(
            mood = %mood,
            intensity,
            dominant = %next.dominant_mood,
            variance = next.mood_variance,
            "folded mood observation"
        );

        next
    }

    /// `sum(value_i * decay^(n-i)) / sum(decay^(n-i))`, 0.0 for an empty window.
    pub fn decayed_average(&self, values: &VecDeque<f64>) -> f64 {
        let n = values.len();
        if n == 0 {
            return 0.0;
        }
        let (weighted, total_weight) = values.iter().enumerate().fold(
            (0.0, 0.0),
            |(weighted, total), (index, value)| {
                let weight = self.config.decay.powi((n - 1 - index) as i32);
                (weighted + value * weight, total + weight)
            },
        );
        if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, limit: usize) {
    history.push_back(value);
    while history.len() > limit {
        history.pop_front();
    }
}

fn dominant_mood(history: &VecDeque<Mood>) -> Mood {
    let mut tally: HashMap<Mood, (usize, usize)> = HashMap::new();
    for (index, mood) in history.iter().enumerate() {
        let entry = tally.entry(*mood).or_insert((0, index));
        entry.0 += 1;
        entry.1 = index;
    }
    tally
        .into_iter()
        .max_by(|(_, (count_a, last_a)), (_, (count_b, last_b))| {
            count_a.cmp(count_b).then(last_a.cmp(last_b))
        })
        .map(|(mood, _)| mood)
        .unwrap_or_default()
}

fn population_variance(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker() -> EmotionDepthTracker {
        EmotionDepthTracker::new(TrackerConfig::default())
    }

    fn feed(observations: &[(Mood, f64)]) -> EmotionalContext {
        let tracker = tracker();
        observations
            .iter()
            .fold(EmotionalContext::default(), |ctx, (mood, intensity)| {
                tracker.update(&ctx, *mood, *intensity, 0.8)
            })
    }

    mod decay {
        use super::*;

        #[test]
        fn three_turn_weighted_average_matches_closed_form() {
            let ctx = feed(&[(Mood::Sad, 0.2), (Mood::Sad, 0.8), (Mood::Sad, 0.5)]);
            let expected =
                (0.2 * 0.8f64.powi(2) + 0.8 * 0.8 + 0.5 * 1.0) / (0.8f64.powi(2) + 0.8 + 1.0);
            assert!((ctx.avg_intensity - expected).abs() < 1e-9);
        }

        #[test]
        fn single_observation_average_is_the_value() {
            let ctx = feed(&[(Mood::Happy, 0.7)]);
            assert!((ctx.avg_intensity - 0.7).abs() < 1e-12);
        }

        #[test]
        fn empty_window_average_is_zero() {
            assert_eq!(tracker().decayed_average(&VecDeque::new()), 0.0);
        }

        #[test]
        fn decay_of_one_is_plain_mean() {
            let tracker = EmotionDepthTracker::new(TrackerConfig {
                decay: 1.0,
                ..TrackerConfig::default()
            });
            let values: VecDeque<f64> = vec![0.2, 0.4, 0.6].into();
            assert!((tracker.decayed_average(&values) - 0.4).abs() < 1e-12);
        }
    }

    mod history {
        use super::*;

        #[test]
        fn histories_are_bounded_fifo() {
            let tracker = EmotionDepthTracker::new(TrackerConfig {
                history_limit: 3,
                ..TrackerConfig::default()
            });
            let mut ctx = EmotionalContext::default();
            for (i, mood) in [Mood::Happy, Mood::Sad, Mood::Calm, Mood::Angry]
                .into_iter()
                .enumerate()
            {
                ctx = tracker.update(&ctx, mood, 0.1 * (i + 1) as f64, 0.5);
            }
            assert_eq!(ctx.mood_history, VecDeque::from(vec![Mood::Sad, Mood::Calm, Mood::Angry]));
            assert_eq!(ctx.intensity_history.len(), 3);
            assert!((ctx.intensity_history[0] - 0.2).abs() < 1e-12);
            assert_eq!(ctx.observation_count, 4);
        }

        #[test]
        fn out_of_range_intensity_is_clamped() {
            let ctx = feed(&[(Mood::Happy, 3.5), (Mood::Happy, f64::NAN)]);
            assert_eq!(ctx.intensity_history, VecDeque::from(vec![1.0, 0.0]));
        }
    }

    mod dominant {
        use super::*;

        #[test]
        fn most_frequent_mood_wins() {
            let ctx = feed(&[(Mood::Sad, 0.5), (Mood::Happy, 0.5), (Mood::Sad, 0.5)]);
            assert_eq!(ctx.dominant_mood, Mood::Sad);
        }

        #[test]
        fn ties_go_to_most_recent() {
            let ctx = feed(&[(Mood::Sad, 0.5), (Mood::Happy, 0.5)]);
            assert_eq!(ctx.dominant_mood, Mood::Happy);

            let ctx = feed(&[(Mood::Happy, 0.5), (Mood::Sad, 0.5), (Mood::Happy, 0.5), (Mood::Sad, 0.5)]);
            assert_eq!(ctx.dominant_mood, Mood::Sad);
        }

        #[test]
        fn empty_history_is_neutral() {
            assert_eq!(EmotionalContext::default().dominant_mood, Mood::Neutral);
        }
    }

    mod variance {
        use super::*;

        #[test]
        fn population_variance_of_intensities() {
            let ctx = feed(&[(Mood::Sad, 0.2), (Mood::Sad, 0.6)]);
            assert!((ctx.mood_variance - 0.04).abs() < 1e-12);
        }

        #[test]
        fn steady_intensities_are_stable() {
            let ctx = feed(&[(Mood::Calm, 0.5), (Mood::Calm, 0.55), (Mood::Calm, 0.5)]);
            assert!(ctx.is_stable);
        }

        #[test]
        fn single_observation_is_not_yet_stable() {
            assert!(!feed(&[(Mood::Calm, 0.5)]).is_stable);
        }

        #[test]
        fn swinging_intensities_are_unstable() {
            let ctx = feed(&[(Mood::Angry, 0.0), (Mood::Angry, 1.0)]);
            assert!(!ctx.is_stable);
        }
    }

    #[test]
    fn update_folds_confidence_into_the_mean() {
        let tracker = EmotionDepthTracker::default();
        let ctx = tracker.update(&EmotionalContext::default(), Mood::Sad, 0.8, 0.6);
        let ctx = tracker.update(&ctx, Mood::Sad, 0.7, 1.0);
        assert!((ctx.mean_confidence() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn mean_confidence_tracks_turns() {
        let mut ctx = EmotionalContext::default();
        assert_eq!(ctx.mean_confidence(), 0.0);
        ctx.record_turn_confidence(0.5);
        ctx.record_turn_confidence(1.0);
        assert!((ctx.mean_confidence() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn context_snapshot_round_trips_through_json() {
        let ctx = feed(&[(Mood::Nostalgic, 0.4), (Mood::Sad, 0.9)]);
        let json = serde_json::to_string(&ctx).unwrap();
        let back: EmotionalContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }

    proptest! {
        #[test]
        fn averages_stay_in_unit_range(intensities in prop::collection::vec(0.0f64..=1.0, 1..30)) {
            let tracker = tracker();
            let ctx = intensities.iter().fold(EmotionalContext::default(), |ctx, i| {
                tracker.update(&ctx, Mood::Anxious, *i, 0.5)
            });
            prop_assert!((0.0..=1.0).contains(&ctx.avg_intensity));
            prop_assert!((0.0..=1.0).contains(&ctx.avg_valence));
            prop_assert!((0.0..=1.0).contains(&ctx.avg_arousal));
            prop_assert!(ctx.mood_variance <= 0.25 + 1e-12);
            prop_assert!(ctx.intensity_history.len() <= tracker.config().history_limit);
        }
    }
}
