//! Offline recommender over a small built-in catalog.
//!
//! Songs are bucketed by mood quadrant; within a bucket the mood's own tracks
//! come first. Used by the console binary when no recommender URL is set.

use async_trait::async_trait;

use crate::domain::conversation::{RecommendationRequest, Song};
use crate::domain::emotion::{Mood, MoodQuadrant};
use crate::ports::{CollaboratorError, Recommender};

struct CatalogEntry {
    id: &'static str,
    title: &'static str,
    artist: &'static str,
    mood: Mood,
    quadrant: MoodQuadrant,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: "pe-01", title: "Walking on Sunshine", artist: "Katrina and the Waves", mood: Mood::Happy, quadrant: MoodQuadrant::PositiveEnergetic },
    CatalogEntry { id: "pe-02", title: "Good as Hell", artist: "Lizzo", mood: Mood::Happy, quadrant: MoodQuadrant::PositiveEnergetic },
    CatalogEntry { id: "pe-03", title: "Don't Stop Me Now", artist: "Queen", mood: Mood::Energetic, quadrant: MoodQuadrant::PositiveEnergetic },
    CatalogEntry { id: "pe-04", title: "Can't Stop the Feeling!", artist: "Justin Timberlake", mood: Mood::Energetic, quadrant: MoodQuadrant::PositiveEnergetic },
    CatalogEntry { id: "pc-01", title: "Banana Pancakes", artist: "Jack Johnson", mood: Mood::Calm, quadrant: MoodQuadrant::PositiveCalm },
    CatalogEntry { id: "pc-02", title: "Put Your Records On", artist: "Corinne Bailey Rae", mood: Mood::Romantic, quadrant: MoodQuadrant::PositiveCalm },
    CatalogEntry { id: "pc-03", title: "Weightless", artist: "Marconi Union", mood: Mood::Focused, quadrant: MoodQuadrant::PositiveCalm },
    CatalogEntry { id: "ne-01", title: "Killing in the Name", artist: "Rage Against the Machine", mood: Mood::Angry, quadrant: MoodQuadrant::NegativeEnergetic },
    CatalogEntry { id: "ne-02", title: "Breathe Me", artist: "Sia", mood: Mood::Anxious, quadrant: MoodQuadrant::NegativeEnergetic },
    CatalogEntry { id: "ne-03", title: "Under Pressure", artist: "Queen & David Bowie", mood: Mood::Anxious, quadrant: MoodQuadrant::NegativeEnergetic },
    CatalogEntry { id: "nc-01", title: "Someone Like You", artist: "Adele", mood: Mood::Sad, quadrant: MoodQuadrant::NegativeCalm },
    CatalogEntry { id: "nc-02", title: "Fix You", artist: "Coldplay", mood: Mood::Sad, quadrant: MoodQuadrant::NegativeCalm },
    CatalogEntry { id: "nc-03", title: "The Night We Met", artist: "Lord Huron", mood: Mood::Nostalgic, quadrant: MoodQuadrant::NegativeCalm },
    CatalogEntry { id: "nc-04", title: "Skinny Love", artist: "Bon Iver", mood: Mood::Sad, quadrant: MoodQuadrant::NegativeCalm },
    CatalogEntry { id: "nt-01", title: "Here Comes the Sun", artist: "The Beatles", mood: Mood::Neutral, quadrant: MoodQuadrant::Neutral },
    CatalogEntry { id: "nt-02", title: "Dreams", artist: "Fleetwood Mac", mood: Mood::Nostalgic, quadrant: MoodQuadrant::Neutral },
];

#[derive(Debug, Clone)]
pub struct StaticRecommender {
    limit: usize,
}

impl Default for StaticRecommender {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

impl StaticRecommender {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    fn select(&self, request: &RecommendationRequest) -> Vec<Song> {
        let mut picks: Vec<&CatalogEntry> = CATALOG
            .iter()
            .filter(|entry| entry.quadrant == request.quadrant || entry.mood == request.mood)
            .filter(|entry| !request.exclude.iter().any(|id| id == entry.id))
            .collect();
        // Stable sort keeps catalog order within each group.
        picks.sort_by_key(|entry| entry.mood != request.mood);

        picks
            .into_iter()
            .take(self.limit)
            .enumerate()
            .map(|(rank, entry)| {
                Song::new(entry.id, entry.title, entry.artist)
                    .with_score(1.0 - rank as f64 * 0.1)
            })
            .collect()
    }
}

#[async_trait]
impl Recommender for StaticRecommender {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<Song>, CollaboratorError> {
        Ok(self.select(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dialogue::ContextSignals;
    use crate::domain::emotion::{EmotionDepthTracker, EmotionalContext};

    fn request_for(mood: Mood) -> RecommendationRequest {
        let ctx = EmotionDepthTracker::default().update(&EmotionalContext::default(), mood, 0.9, 0.8);
        RecommendationRequest::from_context(mood, &ctx, ContextSignals::default(), 2)
    }

    #[tokio::test]
    async fn own_mood_comes_first() {
        let songs = StaticRecommender::default()
            .recommend(&request_for(Mood::Sad))
            .await
            .unwrap();
        assert_eq!(songs.len(), 3);
        assert_eq!(songs[0].id, "nc-01");
        assert_eq!(songs[1].id, "nc-02");
    }

    #[tokio::test]
    async fn excluded_songs_are_skipped() {
        let request = request_for(Mood::Sad).excluding(vec!["nc-01".to_string()]);
        let songs = StaticRecommender::default().recommend(&request).await.unwrap();
        assert!(songs.iter().all(|s| s.id != "nc-01"));
    }

    #[tokio::test]
    async fn scores_descend() {
        let songs = StaticRecommender::new(4)
            .recommend(&request_for(Mood::Happy))
            .await
            .unwrap();
        assert!(songs.windows(2).all(|w| w[0].score > w[1].score));
    }
}
