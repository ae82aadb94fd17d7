//! Mock recommender for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::conversation::{RecommendationRequest, Song};
use crate::ports::{CollaboratorError, Recommender};

/// A scripted outcome.
#[derive(Debug, Clone)]
pub enum MockRecommendation {
    Songs(Vec<Song>),
    Error(CollaboratorError),
}

/// Returns scripted song lists, then a generated list naming the requested mood.
#[derive(Debug, Clone, Default)]
pub struct MockRecommender {
    responses: Arc<Mutex<VecDeque<MockRecommendation>>>,
    delay: Duration,
    always_fail: Option<CollaboratorError>,
    calls: Arc<Mutex<Vec<RecommendationRequest>>>,
}

impl MockRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_songs(self, songs: Vec<Song>) -> Self {
        self.push(MockRecommendation::Songs(songs));
        self
    }

    pub fn with_error(self, error: CollaboratorError) -> Self {
        self.push(MockRecommendation::Error(error));
        self
    }

    /// Fails every call with `error`.
    pub fn failing(mut self, error: CollaboratorError) -> Self {
        self.always_fail = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Requests received, in call order.
    pub fn calls(&self) -> Vec<RecommendationRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<RecommendationRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn push(&self, response: MockRecommendation) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn generated(request: &RecommendationRequest, round: usize) -> Vec<Song> {
        (1..=3)
            .map(|i| {
                Song::new(
                    format!("{}-{}-{}", request.mood, round, i),
                    format!("{} song {}", request.mood, i),
                    "Mock Artist",
                )
            })
            .collect()
    }
}

#[async_trait]
impl Recommender for MockRecommender {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<Song>, CollaboratorError> {
        let round = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(request.clone());
            calls.len()
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }

        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(MockRecommendation::Songs(songs)) => Ok(songs),
            Some(MockRecommendation::Error(error)) => Err(error),
            None => Ok(Self::generated(request, round)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dialogue::ContextSignals;
    use crate::domain::emotion::{EmotionalContext, Mood};

    fn request() -> RecommendationRequest {
        RecommendationRequest::from_context(
            Mood::Calm,
            &EmotionalContext::default(),
            ContextSignals::default(),
            1,
        )
    }

    #[tokio::test]
    async fn generated_lists_differ_per_round() {
        let recommender = MockRecommender::new();
        let first = recommender.recommend(&request()).await.unwrap();
        let second = recommender.recommend(&request()).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(recommender.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_songs_and_errors() {
        let recommender = MockRecommender::new()
            .with_songs(vec![Song::new("a", "A", "X")])
            .with_error(CollaboratorError::Unavailable {
                collaborator: "recommender",
                message: "503".to_string(),
            });
        assert_eq!(recommender.recommend(&request()).await.unwrap()[0].id, "a");
        assert!(recommender.recommend(&request()).await.is_err());
        assert_eq!(recommender.last_request().unwrap().mood, Mood::Calm);
    }
}
